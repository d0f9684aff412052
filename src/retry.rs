//! Exponential retry with a ceiling on the wait between attempts.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{StorageError, StorageResult};

/// Default wait before the first retry.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(100);

/// Default ceiling on the wait between retries.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(1);

/// Retry policy applied by the transport to every remote call.
///
/// The wait doubles after each failed attempt. Once it would exceed
/// `max_backoff` it either restarts at `initial_backoff` (`reset_at_max`) or
/// stays at `max_backoff`. `max_retries` of `None` retries without bound.
#[derive(Debug, Clone)]
pub struct ExponentialRetryWithMaxWait {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_retries: Option<u32>,
    pub reset_at_max: bool,
}

impl Default for ExponentialRetryWithMaxWait {
    fn default() -> Self {
        Self {
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            max_retries: None,
            reset_at_max: true,
        }
    }
}

impl ExponentialRetryWithMaxWait {
    pub fn new(max_retries: Option<u32>) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    pub fn reset_at_max(mut self, reset: bool) -> Self {
        self.reset_at_max = reset;
        self
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(Some(0))
    }

    /// Wait before retry number `retry_count` (1-based).
    pub fn backoff(&self, retry_count: u32) -> Duration {
        let initial = self.initial_backoff.min(self.max_backoff);
        let mut wait = initial;
        for _ in 1..retry_count {
            wait = wait.saturating_mul(2);
            if wait > self.max_backoff {
                wait = if self.reset_at_max {
                    initial
                } else {
                    self.max_backoff
                };
            }
        }
        wait
    }

    /// Whether retry number `retry_count` (1-based) is allowed.
    pub fn should_retry(&self, retry_count: u32) -> bool {
        self.max_retries
            .map(|max| retry_count <= max)
            .unwrap_or(true)
    }

    /// Runs `f` until it succeeds, fails with a non-retryable error, or the
    /// retry budget is spent.
    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut f: F) -> StorageResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StorageResult<T>>,
    {
        let mut retries = 0u32;
        loop {
            match f().await {
                Ok(value) => {
                    if retries > 0 {
                        debug!("{} succeeded after {} retries", operation, retries);
                    }
                    return Ok(value);
                }
                Err(e) if e.is_retryable() => {
                    retries += 1;
                    if !self.should_retry(retries) {
                        return Err(StorageError::RetriesExhausted {
                            operation,
                            attempts: retries,
                            source: Box::new(e),
                        });
                    }
                    let wait = self.backoff(retries);
                    warn!(
                        "{} failed (retry {} in {:?}): {}",
                        operation, retries, wait, e
                    );
                    sleep(wait).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
