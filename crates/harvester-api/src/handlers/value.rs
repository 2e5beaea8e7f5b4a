use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
};
use harvester_common::{MetricId, MetricKind, MetricRecord};

use crate::{error::ApiError, handlers::decode_json, state::AppState};

pub async fn list_metrics(State(state): State<AppState>) -> String {
    state.store.render().await
}

pub async fn value_from_path(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<String, ApiError> {
    let kind = kind.parse::<MetricKind>()?;
    let id = MetricId::parse(id)?;

    let value = match kind {
        MetricKind::Gauge => state.store.get_gauge(&id).await?.to_string(),
        MetricKind::Counter => state.store.get_counter(&id).await?.to_string(),
    };
    Ok(value)
}

/// Looks up the metric named by a `{"id","type"}` body. Payload fields are ignored.
pub async fn value_json(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<MetricRecord>, ApiError> {
    let request: MetricRecord = decode_json(&headers, &body)?;
    let id = MetricId::parse(request.id)?;
    Ok(Json(state.store.query(request.kind, &id).await?))
}
