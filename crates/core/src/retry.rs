//! Data-driven retry policy and executor
//!
//! The policy is a plain struct so retry behavior is configurable and
//! unit-testable independent of the wrapped operation; the executor is the
//! single place that sleeps.

use std::future::Future;

use ledgersync_domain::{Result, SyncError};
use tracing::{debug, warn};

use crate::classify::retry_delay;

/// Retry policy for provider operations.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts: max_attempts.max(1) }
    }

    /// Whether the error is worth another attempt under this policy.
    #[must_use]
    pub fn should_retry(&self, error: &SyncError, attempt: u32) -> bool {
        attempt < self.max_attempts && error.is_retryable()
    }
}

/// Execute `operation`, retrying per `policy`.
///
/// Non-retryable failures and exhausted attempts return the classified error
/// unchanged; retryable failures sleep for the error's delay (provider delay
/// for rate limits, capped exponential backoff otherwise) and re-attempt.
pub async fn run_with_retry<F, Fut, T>(policy: RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1_u32;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) => {
                if !policy.should_retry(&error, attempt) {
                    if attempt >= policy.max_attempts {
                        warn!(attempt, error = %error, "retry attempts exhausted");
                    } else {
                        debug!(error = %error, "error is not retryable");
                    }
                    return Err(error);
                }

                let delay = retry_delay(&error, attempt);
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "operation failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    fn transient() -> SyncError {
        SyncError::ProviderApi { status: 503, message: "unavailable".into() }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);

        let result = run_with_retry(RetryPolicy::new(3), || {
            let calls = Arc::clone(&calls_clone);
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(transient())
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_errors_stop_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);

        let result: Result<()> = run_with_retry(RetryPolicy::new(5), || {
            let calls = Arc::clone(&calls_clone);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SyncError::Validation("missing date".into()))
            }
        })
        .await;

        assert!(matches!(result, Err(SyncError::Validation(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_attempts_return_the_classified_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);

        let result: Result<()> = run_with_retry(RetryPolicy::new(3), || {
            let calls = Arc::clone(&calls_clone);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(transient())
            }
        })
        .await;

        assert!(matches!(result, Err(SyncError::ProviderApi { status: 503, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_waits_the_declared_delay_then_retries_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);
        let started = tokio::time::Instant::now();

        let result = run_with_retry(RetryPolicy::new(3), || {
            let calls = Arc::clone(&calls_clone);
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(SyncError::RateLimit { retry_after_secs: 5 })
                } else {
                    Ok("ok")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let waited = started.elapsed();
        assert!(waited >= std::time::Duration::from_secs(5), "waited {waited:?}");
        assert!(waited < std::time::Duration::from_secs(6), "waited {waited:?}");
    }

    #[test]
    fn policy_honors_attempt_limit_and_error_kind() {
        let policy = RetryPolicy::new(2);
        assert!(policy.should_retry(&transient(), 1));
        assert!(!policy.should_retry(&transient(), 2));
        assert!(!policy.should_retry(&SyncError::Validation("bad".into()), 1));
    }
}
