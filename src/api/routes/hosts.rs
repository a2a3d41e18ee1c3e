//! Host snapshot and metadata endpoints
//!
//! These are thin RPC wrappers over the broker; authentication and
//! authorization for them happen upstream of this process.

use axum::{
    Json,
    extract::{Path, State},
};
use serde_json::{Value, json};
use tracing::debug;

use crate::HostMetadataRecord;
use crate::api::{error::ApiResult, state::ApiState};

/// GET /api/v1/hosts
///
/// Bulk-export the latest snapshot of every host, natural order.
pub async fn fetch_hosts(State(state): State<ApiState>) -> ApiResult<Json<Value>> {
    let snapshots = state.broker.fetch_all().await;

    Ok(Json(json!({
        "hosts": snapshots,
        "count": snapshots.len(),
    })))
}

/// GET /api/v1/hosts/info
///
/// All operator-maintained metadata records.
pub async fn get_host_info(State(state): State<ApiState>) -> ApiResult<Json<Value>> {
    let records = state.broker.get_host_metadata().await?;

    Ok(Json(json!({
        "hosts": records,
        "count": records.len(),
    })))
}

/// POST /api/v1/hosts/info
///
/// Create or overwrite one metadata record, keyed by host name.
pub async fn update_host_info(
    State(state): State<ApiState>,
    Json(record): Json<HostMetadataRecord>,
) -> ApiResult<Json<Value>> {
    debug!("updating metadata for {}", record.name);
    state.broker.upsert_host_metadata(record).await?;

    Ok(Json(json!({ "status": "ok" })))
}

/// DELETE /api/v1/hosts/:name
///
/// Remove a host from the store, offline flags, and persisted snapshots.
/// Metadata is untouched. 404 if the host is not currently stored.
pub async fn delete_host(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    state.broker.delete_host(name).await?;

    Ok(Json(json!({ "status": "deleted" })))
}
