//! Bounded exponential-backoff retry policy.

use std::future::Future;
use std::time::Duration;

use metasync_types::is_retryable;

pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_INITIAL_INTERVAL: Duration = Duration::from_secs(5);
const BACKOFF_MULTIPLIER: u32 = 5;

/// Retries operations that fail with a [`RetryableError`](metasync_types::RetryableError)
/// in their chain.
///
/// The wait before retry `n` (0-based) is `initial_interval * 5^n`, with no
/// jitter and no cap. `max_retries` counts retries after the first attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retrier {
    max_retries: u32,
    initial_interval: Duration,
}

impl Default for Retrier {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_interval: DEFAULT_INITIAL_INTERVAL,
        }
    }
}

impl Retrier {
    /// A zero `initial_interval` falls back to [`DEFAULT_INITIAL_INTERVAL`].
    #[must_use]
    pub fn new(max_retries: u32, initial_interval: Duration) -> Self {
        let initial_interval = if initial_interval.is_zero() {
            DEFAULT_INITIAL_INTERVAL
        } else {
            initial_interval
        };
        Self {
            max_retries,
            initial_interval,
        }
    }

    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    #[must_use]
    pub fn initial_interval(&self) -> Duration {
        self.initial_interval
    }

    /// Wait before the `retry`-th retry (0-based).
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        self.initial_interval
            .saturating_mul(BACKOFF_MULTIPLIER.saturating_pow(retry))
    }

    /// Run `operation` until it succeeds, fails permanently, or the retry
    /// budget is spent. `on_retry` sees each transient error and the wait
    /// that follows it.
    ///
    /// # Errors
    ///
    /// Returns the first permanent error, or the last transient error once
    /// `max_retries` retries have failed.
    pub async fn retry<T, F, Fut, N>(&self, mut operation: F, mut on_retry: N) -> anyhow::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
        N: FnMut(&anyhow::Error, Duration),
    {
        let mut retry = 0u32;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if is_retryable(&err) && retry < self.max_retries => {
                    let delay = self.backoff(retry);
                    on_retry(&err, delay);
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
