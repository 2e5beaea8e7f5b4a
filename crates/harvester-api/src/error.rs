use axum::{
    http::{StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use harvester_common::HarvesterError;
use tracing::{debug, warn};

pub struct ApiError(pub HarvesterError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            HarvesterError::EntityTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            err if err.is_validation() => StatusCode::BAD_REQUEST,
            HarvesterError::MetricNotFound { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.0.error_code();
        if status.is_server_error() {
            warn!(code, error = %self.0, "request failed");
        } else {
            debug!(code, error = %self.0, "request rejected");
        }

        (
            status,
            [(CONTENT_TYPE, "text/plain; charset=utf-8")],
            format!("{}\n", self.0),
        )
            .into_response()
    }
}

impl From<HarvesterError> for ApiError {
    fn from(err: HarvesterError) -> Self {
        ApiError(err)
    }
}

#[cfg(test)]
mod tests {
    use harvester_common::MetricKind;

    use super::*;

    #[test]
    fn status_follows_error_class() {
        let cases = [
            (
                HarvesterError::InvalidMetricId("a_b".into()),
                StatusCode::BAD_REQUEST,
            ),
            (HarvesterError::SignatureDoesNotMatch, StatusCode::BAD_REQUEST),
            (
                HarvesterError::EntityTooLarge { max_size: 16 },
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (
                HarvesterError::MetricNotFound {
                    kind: MetricKind::Gauge,
                    id: "temp".into(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                HarvesterError::ConnectionException("refused".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError(err).status(), status);
        }
    }
}
