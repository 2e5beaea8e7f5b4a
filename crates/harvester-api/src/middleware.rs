use axum::{
    body::{Body, to_bytes},
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use harvester_common::{HarvesterError, hash::HASH_HEADER};
use http_body_util::LengthLimitError;
use tracing::debug;

use crate::{error::ApiError, state::AppState};

/// Upper bound on a buffered batch body after decompression.
pub const MAX_BATCH_BYTES: usize = 16 * 1024 * 1024;

/// Checks the `HashSHA256` header against the HMAC of the request body.
///
/// Runs after request decompression, so the digest covers the JSON bytes the agent signed.
/// Requests without the header, or any request when no key is configured, pass through.
pub async fn verify_signature(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(key) = state.key.as_ref() else {
        return next.run(req).await;
    };

    let signature = req
        .headers()
        .get(HASH_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned);

    let Some(signature) = signature else {
        return next.run(req).await;
    };

    let (parts, body) = req.into_parts();
    let payload = match to_bytes(body, MAX_BATCH_BYTES).await {
        Ok(payload) => payload,
        Err(err) => return ApiError(buffer_error(err)).into_response(),
    };

    if !key.verify(&payload, &signature) {
        return ApiError(HarvesterError::SignatureDoesNotMatch).into_response();
    }

    debug!(bytes = payload.len(), "batch signature verified");
    next.run(Request::from_parts(parts, Body::from(payload))).await
}

fn buffer_error(err: axum::Error) -> HarvesterError {
    let err = err.into_inner();
    if err.downcast_ref::<LengthLimitError>().is_some() {
        HarvesterError::EntityTooLarge {
            max_size: MAX_BATCH_BYTES,
        }
    } else {
        HarvesterError::InvalidArgument(format!("failed to read request body: {err}"))
    }
}
