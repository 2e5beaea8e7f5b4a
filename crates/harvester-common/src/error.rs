use thiserror::Error;

use crate::types::MetricKind;

#[derive(Debug, Error)]
pub enum HarvesterError {
    #[error("invalid metric id: {0}")]
    InvalidMetricId(String),
    #[error("unknown metric type: {0}")]
    UnknownMetricKind(String),
    #[error("invalid {kind} value: {value}")]
    InvalidValue { kind: MetricKind, value: String },
    #[error("{kind} {id} has no {} field", .kind.payload_field())]
    MissingValue { kind: MetricKind, id: String },
    #[error("{kind} not found: {id}")]
    MetricNotFound { kind: MetricKind, id: String },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("request body exceeds {max_size} bytes")]
    EntityTooLarge { max_size: usize },
    #[error("signature does not match")]
    SignatureDoesNotMatch,
    #[error("connection exception: {0}")]
    ConnectionException(String),
    #[error("database error: {0}")]
    Database(String),
    #[error("sink responded with status {status}: {message}")]
    UpstreamStatus { status: u16, message: String },
    #[error("internal error: {0}")]
    InternalError(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl HarvesterError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidMetricId(_) => "InvalidMetricId",
            Self::UnknownMetricKind(_) => "UnknownMetricType",
            Self::InvalidValue { .. } => "InvalidValue",
            Self::MissingValue { .. } => "MissingValue",
            Self::MetricNotFound { .. } => "MetricNotFound",
            Self::InvalidArgument(_) => "InvalidArgument",
            Self::EntityTooLarge { .. } => "EntityTooLarge",
            Self::SignatureDoesNotMatch => "SignatureDoesNotMatch",
            Self::ConnectionException(_) => "ConnectionException",
            Self::Database(_) => "DatabaseError",
            Self::UpstreamStatus { .. } => "UpstreamError",
            Self::InternalError(_) | Self::Io(_) => "InternalError",
        }
    }

    /// Errors caused by the request itself. These are never retried.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidMetricId(_)
                | Self::UnknownMetricKind(_)
                | Self::InvalidValue { .. }
                | Self::MissingValue { .. }
                | Self::InvalidArgument(_)
                | Self::EntityTooLarge { .. }
                | Self::SignatureDoesNotMatch
        )
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::Io(err) if err.kind() == std::io::ErrorKind::PermissionDenied)
    }
}

pub type Result<T> = std::result::Result<T, HarvesterError>;
