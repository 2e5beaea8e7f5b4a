use async_trait::async_trait;
use harvester_common::{HarvesterError, Result, Snapshot};

/// Durable home of a [`Snapshot`]. The store owns the in-memory state; a backend only
/// persists and reloads it whole.
#[async_trait]
pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Persists the complete snapshot, replacing whatever was stored before.
    async fn save(&self, snapshot: &Snapshot) -> Result<()>;

    async fn load(&self) -> Result<Snapshot>;

    async fn ping(&self) -> Result<()>;

    /// Whether `err` is worth retrying against this backend.
    fn is_transient(&self, err: &HarvesterError) -> bool;
}
