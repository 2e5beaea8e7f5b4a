use std::sync::{Mutex, MutexGuard};

use harvester_common::{HarvesterError, MetricKind, MetricRecord, Result, Snapshot};
use tracing::debug;

use crate::sampler::ProcessSampler;

pub const RANDOM_VALUE: &str = "RandomValue";
pub const POLL_COUNT: &str = "PollCount";

/// Aggregates samples between reports.
///
/// Gauges hold the latest sampled value. Counters hold the deltas accumulated since the last
/// batch was taken, so each delta is reported to the sink exactly once.
pub struct Collector {
    sampler: ProcessSampler,
    metrics: Mutex<Snapshot>,
}

impl Default for Collector {
    fn default() -> Self {
        Self::new(ProcessSampler::new())
    }
}

impl Collector {
    pub fn new(sampler: ProcessSampler) -> Self {
        Self {
            sampler,
            metrics: Mutex::new(Snapshot::default()),
        }
    }

    pub fn poll(&self) -> Result<()> {
        let samples = self.sampler.sample();
        let random = rand::random::<f64>();

        let mut metrics = self.lock()?;
        for (name, value) in samples {
            metrics.gauges.insert(name.to_string(), value);
        }
        metrics.gauges.insert(RANDOM_VALUE.to_string(), random);
        let polls = metrics.counters.entry(POLL_COUNT.to_string()).or_insert(0);
        *polls = polls.wrapping_add(1);
        debug!(gauges = metrics.gauges.len(), "metrics polled");
        Ok(())
    }

    /// Current gauges plus the pending counter deltas, which are cleared.
    pub fn take_batch(&self) -> Result<Vec<MetricRecord>> {
        let mut metrics = self.lock()?;
        let records = metrics.to_records();
        metrics.counters.clear();
        Ok(records)
    }

    /// Credits the counter deltas of an undelivered batch back for the next report.
    pub fn restore(&self, records: &[MetricRecord]) -> Result<()> {
        let mut metrics = self.lock()?;
        for record in records {
            if let (MetricKind::Counter, Some(delta)) = (record.kind, record.delta) {
                let total = metrics.counters.entry(record.id.clone()).or_insert(0);
                *total = total.wrapping_add(delta);
            }
        }
        Ok(())
    }

    pub fn snapshot(&self) -> Result<Snapshot> {
        Ok(self.lock()?.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Snapshot>> {
        self.metrics
            .lock()
            .map_err(|_| HarvesterError::InternalError("collector lock poisoned".to_string()))
    }
}
