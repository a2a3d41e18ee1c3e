//! HTTP and WebSocket surface of the relay
//!
//! ## Endpoints
//!
//! - `GET /api/v1/health` - liveness + broker counters
//! - `GET /api/v1/hosts` - bulk export of current snapshots
//! - `GET /api/v1/hosts/info` - host metadata records
//! - `POST /api/v1/hosts/info` - upsert one metadata record
//! - `DELETE /api/v1/hosts/:name` - remove a host
//! - `WS /api/v1/report` - producer connection
//! - `WS /api/v1/stream` - consumer connection
//!
//! Routing, CORS, and request auth are glue; everything stateful lives in
//! the broker.

pub mod error;
pub mod routes;
pub mod state;
pub mod websocket;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;

use std::net::SocketAddr;

use axum::{
    Router,
    routing::{delete, get},
};
use tracing::info;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address (e.g., "0.0.0.0:8080")
    pub bind_addr: SocketAddr,

    /// Enable CORS for browser-based viewers
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".parse().unwrap(),
            enable_cors: true,
        }
    }
}

/// Spawn the API server
///
/// Starts an Axum HTTP server in a background task and returns the local
/// address it bound to.
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    info!("starting API server on {}", config.bind_addr);

    let mut app = Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .route("/api/v1/hosts", get(routes::hosts::fetch_hosts))
        .route(
            "/api/v1/hosts/info",
            get(routes::hosts::get_host_info).post(routes::hosts::update_host_info),
        )
        .route("/api/v1/hosts/:name", delete(routes::hosts::delete_host))
        .route("/api/v1/report", get(websocket::producer_handler))
        .route("/api/v1/stream", get(websocket::consumer_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
