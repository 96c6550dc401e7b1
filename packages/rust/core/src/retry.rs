//! Bounded retry with per-attempt timeouts for external calls.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use writerpack_shared::{Result, RetryConfig, WriterPackError};

/// Retry budget for one class of external call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    /// Deadline for each individual attempt.
    pub timeout: Duration,
    /// Delay before the second attempt; doubles after each failure.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Model calls: research, drafting, keyword and query generation.
    pub fn generation(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            timeout: config.generation_timeout(),
            backoff: Duration::from_millis(config.backoff_ms),
        }
    }

    pub fn search(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            timeout: config.search_timeout(),
            backoff: Duration::from_millis(config.backoff_ms),
        }
    }

    /// Creating a CMS draft is not idempotent, so it gets a single attempt.
    pub fn publish(config: &RetryConfig) -> Self {
        Self {
            max_attempts: 1,
            timeout: config.publish_timeout(),
            backoff: Duration::ZERO,
        }
    }

    fn delay_before(&self, attempt: u32) -> Duration {
        // attempt is 1-based; the first retry waits `backoff`
        self.backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// Run `call` until it succeeds, fails permanently, or the budget is spent.
///
/// Each attempt is bounded by `policy.timeout`. Only errors for which
/// [`WriterPackError::is_retryable`] holds are retried; the last error is
/// returned unchanged.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let outcome = match tokio::time::timeout(policy.timeout, call()).await {
            Ok(result) => result,
            Err(_) => Err(WriterPackError::Timeout {
                operation: operation.to_string(),
                secs: policy.timeout.as_secs(),
            }),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < attempts => {
                let delay = policy.delay_before(attempt);
                warn!(
                    operation,
                    attempt,
                    max_attempts = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "call failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
