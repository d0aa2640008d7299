//! Timeout-bounded calls with backoff retry for transient failures.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::backoff::{ExponentialBackoff, RetryPolicy};
use crate::observability::record_transient_retry;

/// Errors that distinguish transient infrastructure failures from the rest.
pub trait TransientError: std::error::Error {
    /// Whether retrying the same call may succeed.
    fn is_transient(&self) -> bool;

    /// Error produced when a call exceeds its timeout.
    fn timed_out(after: Duration) -> Self;
}

/// Outcome of a retried call that did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E: std::error::Error> {
    /// The error is not transient; it was not retried.
    #[error("{0}")]
    Permanent(E),

    /// Every attempt failed with a transient error.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// Last error seen.
        last: E,
    },

    /// Shutdown was requested while waiting to retry.
    #[error("cancelled while retrying: {last}")]
    Cancelled {
        /// Last error seen.
        last: E,
    },
}

impl<E: std::error::Error> RetryError<E> {
    /// The underlying error.
    pub const fn inner(&self) -> &E {
        match self {
            Self::Permanent(e) | Self::Exhausted { last: e, .. } | Self::Cancelled { last: e } => e,
        }
    }
}

/// Run `fut`, mapping a timeout to `E::timed_out`.
pub async fn with_timeout<T, E, F>(timeout: Duration, fut: F) -> Result<T, E>
where
    E: TransientError,
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(E::timed_out(timeout)),
    }
}

/// Call `op`, retrying transient failures with backoff.
///
/// Non-transient errors return immediately as [`RetryError::Permanent`].
/// Callers bound each attempt with [`with_timeout`].
pub async fn retry_transient<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    E: TransientError,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut backoff = ExponentialBackoff::new(policy);
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_transient() => return Err(RetryError::Permanent(err)),
            Err(err) => err,
        };

        let Some(delay) = backoff.next_backoff() else {
            return Err(RetryError::Exhausted {
                attempts,
                last: err,
            });
        };

        tracing::warn!(
            operation,
            attempt = attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "transient failure, retrying"
        );
        record_transient_retry(operation);

        tokio::select! {
            () = cancel.cancelled() => return Err(RetryError::Cancelled { last: err }),
            () = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, thiserror::Error, PartialEq, Eq)]
    enum TestError {
        #[error("down")]
        Down,
        #[error("bad")]
        Bad,
        #[error("timeout")]
        Timeout,
    }

    impl TransientError for TestError {
        fn is_transient(&self) -> bool {
            matches!(self, Self::Down | Self::Timeout)
        }

        fn timed_out(_after: Duration) -> Self {
            Self::Timeout
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = retry_transient(
            &RetryPolicy::immediate(5, 0),
            "test",
            &CancellationToken::new(),
            || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(TestError::Down)
                } else {
                    Ok(7)
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_transient(
            &RetryPolicy::immediate(5, 0),
            "test",
            &CancellationToken::new(),
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TestError::Bad)
            },
        )
        .await;

        assert!(matches!(result, Err(RetryError::Permanent(TestError::Bad))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts() {
        let result: Result<(), _> = retry_transient(
            &RetryPolicy::immediate(2, 0),
            "test",
            &CancellationToken::new(),
            || async { Err(TestError::Down) },
        )
        .await;

        match result {
            Err(RetryError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert_eq!(last, TestError::Down);
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_transient() {
        let calls = AtomicU32::new(0);
        let result = retry_transient(
            &RetryPolicy::immediate(1, 0),
            "test",
            &CancellationToken::new(),
            || {
                with_timeout(Duration::from_millis(50), async {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                    }
                    Ok::<_, TestError>(1)
                })
            },
        )
        .await;

        assert_eq!(result.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancellation_stops_retrying() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let policy = RetryPolicy {
            initial_backoff: Duration::from_secs(60),
            jitter_factor: 0.0,
            ..RetryPolicy::default()
        };

        let result: Result<(), _> =
            retry_transient(&policy, "test", &cancel, || async { Err(TestError::Down) }).await;

        assert!(matches!(result, Err(RetryError::Cancelled { .. })));
    }
}
