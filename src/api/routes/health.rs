//! Health check endpoint

use axum::{Json, extract::State};
use serde_json::{Value, json};

use crate::api::state::ApiState;

/// GET /api/v1/health
///
/// Returns liveness plus broker counters
pub async fn health_check(State(state): State<ApiState>) -> Json<Value> {
    let stats = state.broker.stats().await.unwrap_or_default();

    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "hosts": stats.hosts,
        "producers": stats.producers,
        "consumers": stats.consumers,
    }))
}
