use axum::{extract::State, http::StatusCode};
use tracing::warn;

use crate::state::AppState;

pub async fn ping(State(state): State<AppState>) -> StatusCode {
    match state.store.ping().await {
        Ok(()) => StatusCode::OK,
        Err(err) => {
            warn!(
                backend = state.store.backend_name(),
                error = %err,
                "storage backend unreachable"
            );
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
