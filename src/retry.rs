//! Bounded retry with exponential backoff
//!
//! A single explicit combinator instead of per-call-site retry loops:
//! transient errors (per `Error::is_retryable`) are retried up to the
//! attempt limit, everything else fails immediately.

use backoff::{future::retry, ExponentialBackoff};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::config::EtherscanConfig;
use crate::error::{Error, Result};

/// Attempt and backoff bounds for one retried operation
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    pub fn from_config(config: &EtherscanConfig) -> Self {
        Self {
            max_attempts: config.max_retries,
            base_delay: Duration::from_secs(config.retry_base_secs),
            max_delay: Duration::from_secs(config.retry_max_secs),
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.base_delay,
            max_interval: self.max_delay,
            // Attempts are counted explicitly, not time-bounded
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

/// Run `op`, retrying transient failures under `policy`.
///
/// Returns the first success, or the last error once attempts are exhausted
/// or a permanent error is seen.
pub async fn with_retries<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts;
    let mut attempts = 0u32;

    retry(policy.backoff(), || {
        attempts += 1;
        let attempt = attempts;
        let fut = op();
        async move {
            match fut.await {
                Ok(value) => Ok(value),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    warn!("Attempt {}/{} failed: {}", attempt, max_attempts, e);
                    Err(backoff::Error::transient(e))
                }
                Err(e) => Err(backoff::Error::permanent(e)),
            }
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            max_attempts,
            Duration::from_millis(1),
            Duration::from_millis(2),
        )
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_retries(&fast_policy(3), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::Http("connection reset".to_string()))
                } else {
                    Ok(42u32)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausts_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<u32> = with_retries(&fast_policy(3), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::Http("down".to_string())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<u32> = with_retries(&fast_policy(3), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::InvalidAddress("0x".to_string())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
