use std::{io::Write, sync::Arc};

use flate2::{Compression, write::GzEncoder};
use harvester_common::{HarvesterError, MetricRecord, Result, RetryPolicy, SigningKey};
use tokio::{sync::Semaphore, task::JoinHandle};
use tracing::{debug, warn};

use crate::{
    collector::Collector,
    sink::{Sink, Submission},
};

/// Ships collector batches to a [`Sink`] with at most `rate_limit` submissions in flight.
///
/// A report tick that finds every permit taken is dropped, not queued, so a slow sink never
/// backs up the report timer.
pub struct Dispatcher {
    collector: Arc<Collector>,
    sink: Arc<dyn Sink>,
    key: Option<SigningKey>,
    permits: Arc<Semaphore>,
    retry: RetryPolicy,
}

impl Dispatcher {
    pub fn new(
        collector: Arc<Collector>,
        sink: Arc<dyn Sink>,
        key: Option<SigningKey>,
        rate_limit: usize,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            collector,
            sink,
            key,
            permits: Arc::new(Semaphore::new(rate_limit.max(1))),
            retry,
        }
    }

    /// Starts one submission in the background. Returns `None` when the tick is dropped
    /// because the rate limit is reached or there is nothing to send.
    pub fn dispatch(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
            warn!("rate limit reached, dropping report");
            return None;
        };

        let records = match self.collector.take_batch() {
            Ok(records) if records.is_empty() => return None,
            Ok(records) => records,
            Err(err) => {
                warn!(error = %err, "failed to take metrics batch");
                return None;
            }
        };

        let dispatcher = Arc::clone(self);
        Some(tokio::spawn(async move {
            if let Err(err) = dispatcher.deliver(&records).await {
                warn!(error = %err, records = records.len(), "failed to report metrics");
                if let Err(err) = dispatcher.collector.restore(&records) {
                    warn!(error = %err, "failed to re-credit undelivered counters");
                }
            }
            drop(permit);
        }))
    }

    async fn deliver(&self, records: &[MetricRecord]) -> Result<()> {
        let submission = encode_batch(records, self.key.as_ref())?;
        let sink = &self.sink;
        let submission = &submission;
        self.retry
            .run("report", move || sink.submit(submission), is_retryable)
            .await?;
        debug!(records = records.len(), "metrics reported");
        Ok(())
    }
}

/// Serializes, signs and gzips one batch. The signature covers the uncompressed JSON.
pub fn encode_batch(records: &[MetricRecord], key: Option<&SigningKey>) -> Result<Submission> {
    let json = serde_json::to_vec(records)
        .map_err(|e| HarvesterError::InternalError(format!("encode batch: {e}")))?;
    let signature = key.map(|key| key.sign(&json));

    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(&json)?;
    let body = encoder.finish()?;

    Ok(Submission {
        body,
        signature,
        records: records.len(),
    })
}

/// Transport failures and server-side errors are worth another attempt; a 4xx reply means
/// the batch itself was rejected.
pub fn is_retryable(err: &HarvesterError) -> bool {
    match err {
        HarvesterError::ConnectionException(_) => true,
        HarvesterError::UpstreamStatus { status, .. } => *status >= 500,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::Read,
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use async_trait::async_trait;
    use flate2::read::GzDecoder;
    use harvester_common::MetricKind;
    use tokio::sync::Notify;

    use super::*;
    use crate::collector::POLL_COUNT;

    /// Records submissions and fails the first `failures` of them.
    #[derive(Default)]
    struct MockSink {
        calls: AtomicUsize,
        failures: usize,
        failure_status: u16,
        delivered: Mutex<Vec<Submission>>,
        gate: Option<Arc<Notify>>,
    }

    #[async_trait]
    impl Sink for MockSink {
        async fn submit(&self, submission: &Submission) -> Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if call < self.failures {
                return Err(HarvesterError::UpstreamStatus {
                    status: self.failure_status,
                    message: "unavailable".to_string(),
                });
            }
            self.delivered.lock().unwrap().push(submission.clone());
            Ok(())
        }
    }

    fn polled_collector(polls: usize) -> Arc<Collector> {
        let collector = Arc::new(Collector::default());
        for _ in 0..polls {
            collector.poll().unwrap();
        }
        collector
    }

    fn decode(submission: &Submission) -> (Vec<u8>, Vec<MetricRecord>) {
        let mut json = Vec::new();
        GzDecoder::new(&submission.body[..])
            .read_to_end(&mut json)
            .unwrap();
        let records = serde_json::from_slice(&json).unwrap();
        (json, records)
    }

    #[test]
    fn encoded_batch_is_gzipped_and_signed_over_json() {
        let records = vec![
            MetricRecord::gauge("Alloc", 123.65),
            MetricRecord::counter(POLL_COUNT, 3),
        ];
        let key = SigningKey::new("secret").unwrap();
        let submission = encode_batch(&records, Some(&key)).unwrap();

        let (json, decoded) = decode(&submission);
        assert_eq!(decoded, records);
        assert_eq!(submission.signature.as_deref(), Some(key.sign(&json).as_str()));
        assert!(encode_batch(&records, None).unwrap().signature.is_none());
    }

    #[test]
    fn client_errors_are_not_retried() {
        assert!(is_retryable(&HarvesterError::ConnectionException("x".into())));
        assert!(is_retryable(&HarvesterError::UpstreamStatus {
            status: 503,
            message: String::new(),
        }));
        assert!(!is_retryable(&HarvesterError::UpstreamStatus {
            status: 400,
            message: String::new(),
        }));
        assert!(!is_retryable(&HarvesterError::SignatureDoesNotMatch));
    }

    #[tokio::test]
    async fn delivers_batch_to_sink() {
        let sink = Arc::new(MockSink::default());
        let dispatcher = Arc::new(Dispatcher::new(
            polled_collector(2),
            sink.clone(),
            None,
            1,
            RetryPolicy::never(),
        ));

        dispatcher.dispatch().unwrap().await.unwrap();

        let delivered = sink.delivered.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        let (_, records) = decode(&delivered[0]);
        assert!(records.contains(&MetricRecord::counter(POLL_COUNT, 2)));
        assert!(
            records
                .iter()
                .filter(|record| record.kind == MetricKind::Gauge)
                .count()
                > 1
        );
    }

    #[tokio::test]
    async fn overlapping_tick_is_dropped_at_rate_limit() {
        let gate = Arc::new(Notify::new());
        let sink = Arc::new(MockSink {
            gate: Some(Arc::clone(&gate)),
            ..MockSink::default()
        });
        let collector = polled_collector(1);
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&collector),
            sink.clone(),
            None,
            1,
            RetryPolicy::never(),
        ));

        let in_flight = dispatcher.dispatch().expect("first tick admitted");
        collector.poll().unwrap();
        assert!(dispatcher.dispatch().is_none());

        gate.notify_one();
        in_flight.await.unwrap();
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);

        // The permit is back and the dropped tick's counter delta is still pending.
        let snapshot = collector.snapshot().unwrap();
        assert_eq!(snapshot.counters.get(POLL_COUNT), Some(&1));
        assert!(dispatcher.dispatch().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried() {
        let sink = Arc::new(MockSink {
            failures: 2,
            failure_status: 503,
            ..MockSink::default()
        });
        let dispatcher = Arc::new(Dispatcher::new(
            polled_collector(1),
            sink.clone(),
            None,
            1,
            RetryPolicy::default(),
        ));

        let started = tokio::time::Instant::now();
        dispatcher.dispatch().unwrap().await.unwrap();

        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
        assert_eq!(sink.delivered.lock().unwrap().len(), 1);
        assert_eq!(started.elapsed(), Duration::from_secs(1 + 3));
    }

    #[tokio::test]
    async fn rejected_batch_recredits_counters() {
        let sink = Arc::new(MockSink {
            failures: usize::MAX,
            failure_status: 400,
            ..MockSink::default()
        });
        let collector = polled_collector(3);
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&collector),
            sink.clone(),
            None,
            1,
            RetryPolicy::default(),
        ));

        dispatcher.dispatch().unwrap().await.unwrap();

        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
        let snapshot = collector.snapshot().unwrap();
        assert_eq!(snapshot.counters.get(POLL_COUNT), Some(&3));
    }
}
