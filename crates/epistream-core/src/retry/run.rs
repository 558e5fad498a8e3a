//! Retry loop: run an async attempt until success or policy says stop.

use std::future::Future;
use std::time::Duration;

use super::classify;
use super::error::TransferError;
use super::policy::{RetryDecision, RetryPolicy};

/// Runs `attempt` until it succeeds or the retry policy says to stop.
///
/// Each call receives its 1-based attempt number and is bounded by
/// `attempt_timeout`; a timeout counts as one failed attempt. On retryable
/// failure, sleeps for the backoff duration then tries again.
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    attempt_timeout: Duration,
    what: &'static str,
    mut attempt: F,
) -> Result<T, TransferError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, TransferError>>,
{
    let mut n = 1u32;
    loop {
        let result = match tokio::time::timeout(attempt_timeout, attempt(n)).await {
            Ok(r) => r,
            Err(_) => Err(TransferError::TimedOut {
                what,
                after: attempt_timeout,
            }),
        };
        match result {
            Ok(v) => return Ok(v),
            Err(e) => {
                let kind = classify::classify(&e);
                match policy.decide(n, kind) {
                    RetryDecision::NoRetry => return Err(e),
                    RetryDecision::RetryAfter(d) => {
                        tracing::debug!(attempt = n, ?kind, delay = ?d, "{} failed: {}; retrying", what, e);
                        tokio::time::sleep(d).await;
                        n += 1;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let out = run_with_retry(&fast_policy(3), Duration::from_secs(5), "test", |n| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 3 {
                    Err(TransferError::Connection("reset".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(out, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_budget() {
        let calls = AtomicU32::new(0);
        let err = run_with_retry(&fast_policy(3), Duration::from_secs(5), "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(TransferError::Http(502)) }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, TransferError::Http(502)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_stops_immediately() {
        let calls = AtomicU32::new(0);
        let err = run_with_retry(&fast_policy(3), Duration::from_secs(5), "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(TransferError::NotFound("x".into())) }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, TransferError::NotFound(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timeout_counts_as_one_attempt() {
        let calls = AtomicU32::new(0);
        let out = run_with_retry(&fast_policy(3), Duration::from_millis(20), "slow", |n| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 1 {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
                Ok::<_, TransferError>(n)
            }
        })
        .await
        .unwrap();
        assert_eq!(out, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
