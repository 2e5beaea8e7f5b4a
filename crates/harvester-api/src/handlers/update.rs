use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use harvester_common::{MetricRecord, MetricUpdate, Snapshot};
use tracing::debug;

use crate::{error::ApiError, handlers::decode_json, state::AppState};

pub async fn update_from_path(
    State(state): State<AppState>,
    Path((kind, id, value)): Path<(String, String, String)>,
) -> Result<StatusCode, ApiError> {
    let update = MetricUpdate::from_segments(&kind, &id, &value)?;
    let record = state.store.apply(&update).await?;
    debug!(id = %record.id, kind = %record.kind, "metric updated");
    Ok(StatusCode::OK)
}

pub async fn update_json(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<MetricRecord>, ApiError> {
    let record: MetricRecord = decode_json(&headers, &body)?;
    let update = MetricUpdate::from_record(&record)?;
    Ok(Json(state.store.apply(&update).await?))
}

/// Applies a batch and answers with the resulting store contents.
pub async fn update_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Snapshot>, ApiError> {
    let records: Vec<MetricRecord> = decode_json(&headers, &body)?;
    state.store.set_batch(&records).await?;
    debug!(records = records.len(), "batch applied");
    Ok(Json(state.store.snapshot().await))
}
