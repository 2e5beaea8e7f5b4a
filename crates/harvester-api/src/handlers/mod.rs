pub mod health;
pub mod update;
pub mod value;

use axum::http::{HeaderMap, header::CONTENT_TYPE};
use harvester_common::{HarvesterError, Result};
use serde::de::DeserializeOwned;

const JSON_MEDIA_TYPE: &str = "application/json";

/// Decodes a JSON request body after checking the declared media type.
pub(crate) fn decode_json<T: DeserializeOwned>(headers: &HeaderMap, body: &[u8]) -> Result<T> {
    if !declares_json(headers) {
        let declared = headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("");
        return Err(HarvesterError::InvalidArgument(format!(
            "wrong Content-Type header [{declared}]"
        )));
    }

    serde_json::from_slice(body)
        .map_err(|e| HarvesterError::InvalidArgument(format!("malformed metrics json: {e}")))
}

fn declares_json(headers: &HeaderMap) -> bool {
    headers
        .get_all(CONTENT_TYPE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split([' ', ',', ';']))
        .any(|part| part.eq_ignore_ascii_case(JSON_MEDIA_TYPE))
}
