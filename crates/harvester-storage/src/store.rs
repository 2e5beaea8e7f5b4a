use std::sync::Arc;

use harvester_common::{
    HarvesterError, MetricId, MetricKind, MetricRecord, MetricUpdate, Result, Snapshot,
    finite_gauge,
};
use tokio::sync::Mutex;
use tracing::info;

use crate::memory::MemoryBackend;
use crate::traits::Backend;

/// Gauges and counters behind one lock, persisted through a pluggable [`Backend`].
///
/// Every operation takes the lock for its whole duration, including the backend write when
/// save-on-write is enabled. With save-on-write a mutation is staged on a copy and only
/// becomes visible once the backend accepted it, so a failed write changes nothing.
pub struct MetricStore {
    metrics: Mutex<Snapshot>,
    backend: Arc<dyn Backend>,
    save_on_write: bool,
}

impl MetricStore {
    pub fn new(backend: Arc<dyn Backend>, save_on_write: bool) -> Self {
        Self {
            metrics: Mutex::new(Snapshot::default()),
            backend,
            save_on_write,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()), false)
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub async fn get_gauge(&self, id: &MetricId) -> Result<f64> {
        let metrics = self.metrics.lock().await;
        metrics
            .gauges
            .get(id.as_str())
            .copied()
            .ok_or_else(|| not_found(MetricKind::Gauge, id))
    }

    pub async fn set_gauge(&self, id: &MetricId, value: f64) -> Result<()> {
        let value = finite_gauge(value)?;
        self.write(|metrics| {
            metrics.gauges.insert(id.to_string(), value);
        })
        .await
    }

    pub async fn get_counter(&self, id: &MetricId) -> Result<i64> {
        let metrics = self.metrics.lock().await;
        metrics
            .counters
            .get(id.as_str())
            .copied()
            .ok_or_else(|| not_found(MetricKind::Counter, id))
    }

    /// Creates the counter at `delta` or adds `delta` to it.
    pub async fn set_counter(&self, id: &MetricId, delta: i64) -> Result<()> {
        self.write(|metrics| {
            add_counter(metrics, id, delta);
        })
        .await
    }

    /// Applies one update and returns the record as stored afterwards.
    pub async fn apply(&self, update: &MetricUpdate) -> Result<MetricRecord> {
        self.write(|metrics| apply_update(metrics, update)).await
    }

    /// Validates every record first; if any is rejected nothing is applied.
    pub async fn set_batch(&self, records: &[MetricRecord]) -> Result<()> {
        let updates = records
            .iter()
            .map(MetricUpdate::from_record)
            .collect::<Result<Vec<_>>>()?;

        self.write(|metrics| {
            for update in &updates {
                apply_update(metrics, update);
            }
        })
        .await
    }

    pub async fn query(&self, kind: MetricKind, id: &MetricId) -> Result<MetricRecord> {
        match kind {
            MetricKind::Gauge => Ok(MetricRecord::gauge(id.as_str(), self.get_gauge(id).await?)),
            MetricKind::Counter => Ok(MetricRecord::counter(
                id.as_str(),
                self.get_counter(id).await?,
            )),
        }
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.metrics.lock().await.clone()
    }

    pub async fn render(&self) -> String {
        self.metrics.lock().await.render()
    }

    /// Writes the complete current state to the backend.
    pub async fn save(&self) -> Result<()> {
        let metrics = self.metrics.lock().await;
        self.backend.save(&metrics).await
    }

    /// Replaces the in-memory state with the backend's snapshot. Nothing is merged.
    pub async fn read(&self) -> Result<()> {
        let loaded = self.backend.load().await?;
        loaded.validate()?;

        let mut metrics = self.metrics.lock().await;
        *metrics = loaded;
        info!(
            backend = self.backend.name(),
            gauges = metrics.gauges.len(),
            counters = metrics.counters.len(),
            "metrics restored"
        );
        Ok(())
    }

    pub async fn ping(&self) -> Result<()> {
        self.backend.ping().await
    }

    pub fn is_transient(&self, err: &HarvesterError) -> bool {
        self.backend.is_transient(err)
    }

    async fn write<T>(&self, change: impl FnOnce(&mut Snapshot) -> T) -> Result<T> {
        let mut metrics = self.metrics.lock().await;
        if !self.save_on_write {
            return Ok(change(&mut metrics));
        }

        let mut staged = metrics.clone();
        let out = change(&mut staged);
        self.backend.save(&staged).await?;
        *metrics = staged;
        Ok(out)
    }
}

fn apply_update(metrics: &mut Snapshot, update: &MetricUpdate) -> MetricRecord {
    match update {
        MetricUpdate::Gauge { id, value } => {
            metrics.gauges.insert(id.to_string(), *value);
            MetricRecord::gauge(id.as_str(), *value)
        }
        MetricUpdate::Counter { id, delta } => {
            let total = add_counter(metrics, id, *delta);
            MetricRecord::counter(id.as_str(), total)
        }
    }
}

fn add_counter(metrics: &mut Snapshot, id: &MetricId, delta: i64) -> i64 {
    let total = metrics.counters.entry(id.to_string()).or_insert(0);
    *total = total.wrapping_add(delta);
    *total
}

fn not_found(kind: MetricKind, id: &MetricId) -> HarvesterError {
    HarvesterError::MetricNotFound {
        kind,
        id: id.to_string(),
    }
}
