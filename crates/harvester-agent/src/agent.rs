use std::{future::Future, sync::Arc, time::Duration};

use harvester_common::RetryPolicy;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{info, warn};

use crate::{
    collector::Collector,
    config::AgentConfig,
    dispatcher::Dispatcher,
    sink::{HttpSink, Sink},
};

/// Poll and report loops sharing one collector.
pub struct Agent {
    collector: Arc<Collector>,
    dispatcher: Arc<Dispatcher>,
    poll_interval: Duration,
    report_interval: Duration,
}

impl Agent {
    pub fn new(config: &AgentConfig) -> Self {
        let sink: Arc<dyn Sink> = Arc::new(HttpSink::new(&config.address));
        Self::with_sink(config, sink)
    }

    pub fn with_sink(config: &AgentConfig, sink: Arc<dyn Sink>) -> Self {
        let collector = Arc::new(Collector::default());
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&collector),
            sink,
            config.key.clone(),
            config.rate_limit,
            RetryPolicy::default(),
        ));
        Self {
            collector,
            dispatcher,
            poll_interval: config.poll_interval,
            report_interval: config.report_interval,
        }
    }

    /// Runs both timers until `shutdown` resolves. Ticks stop immediately; submissions already
    /// in flight are abandoned with the process.
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        let collector = Arc::clone(&self.collector);
        let poll_interval = self.poll_interval;
        let poller = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + poll_interval, poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(err) = collector.poll() {
                    warn!(error = %err, "failed to poll metrics");
                }
            }
        });

        let dispatcher = Arc::clone(&self.dispatcher);
        let report_interval = self.report_interval;
        let reporter = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + report_interval, report_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                dispatcher.dispatch();
            }
        });

        info!(
            poll_secs = poll_interval.as_secs(),
            report_secs = report_interval.as_secs(),
            "agent started"
        );
        shutdown.await;
        poller.abort();
        reporter.abort();
        info!("agent stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use harvester_common::Result;

    use super::*;
    use crate::sink::Submission;

    #[derive(Default)]
    struct CountingSink {
        calls: AtomicUsize,
        sizes: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl Sink for CountingSink {
        async fn submit(&self, submission: &Submission) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.sizes.lock().unwrap().push(submission.records);
            Ok(())
        }
    }

    fn config() -> AgentConfig {
        AgentConfig {
            address: "http://localhost:8080".to_string(),
            poll_interval: Duration::from_secs(2),
            report_interval: Duration::from_secs(10),
            key: None,
            rate_limit: 1,
            log_level: "info".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reports_on_report_interval() {
        let sink = Arc::new(CountingSink::default());
        let agent = Agent::with_sink(&config(), sink.clone());

        agent
            .run(tokio::time::sleep(Duration::from_secs(25)))
            .await;

        // Reports at 10s and 20s, each after several polls.
        assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
        assert!(sink.sizes.lock().unwrap().iter().all(|size| *size > 1));
    }
}
