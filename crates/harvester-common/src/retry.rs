use std::{future::Future, time::Duration};

use tokio::time::sleep;
use tracing::warn;

use crate::error::{HarvesterError, Result};

pub const DEFAULT_MAX_ATTEMPTS: usize = 3;
pub const DEFAULT_BACKOFF: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(3),
    Duration::from_secs(5),
];

/// Bounded retry with a fixed escalating backoff schedule.
///
/// The delay before attempt `n + 1` is the `n`-th schedule entry; once the schedule runs out the
/// last entry repeats. Nothing is persisted between calls, so every invocation starts fresh.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    backoff: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BACKOFF.to_vec())
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, backoff: Vec<Duration>) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Single attempt, no retries.
    pub fn never() -> Self {
        Self::new(1, Vec::new())
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn delay_after(&self, attempt: usize) -> Duration {
        let index = attempt.saturating_sub(1);
        self.backoff
            .get(index)
            .or_else(|| self.backoff.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    /// Runs `operation` until it succeeds, fails with an error `retryable` rejects, or the
    /// attempt bound is reached. The last error is returned in the two failure cases.
    pub async fn run<T, F, Fut, P>(&self, label: &str, mut operation: F, retryable: P) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        P: Fn(&HarvesterError) -> bool,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_attempts && retryable(&err) => {
                    let delay = self.delay_after(attempt);
                    warn!(
                        operation = label,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure, retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
