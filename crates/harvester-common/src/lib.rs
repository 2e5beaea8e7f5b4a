pub mod error;
pub mod hash;
pub mod retry;
pub mod types;

pub use error::{HarvesterError, Result};
pub use hash::SigningKey;
pub use retry::RetryPolicy;
pub use types::{MetricId, MetricKind, MetricRecord, MetricUpdate, Snapshot, finite_gauge};
