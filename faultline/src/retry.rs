//! Bounded retry loop around an arbitrary asynchronous operation.
//!
//! The executor drives the operation, consults the classifier for
//! retryability and the backoff schedule for waits, and surfaces a
//! terminal [`RetryError`] on exhaustion. The surfaced failure is
//! always the real last failure, never a synthetic exhaustion error.

use crate::backoff::compute_wait;
use crate::cancellation::CancellationToken;
use crate::classify::is_retryable;
use crate::errors::{OpError, RetryError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Observer invoked before each backoff wait.
///
/// Receives the 1-indexed attempt number, the computed wait, and the
/// failure that triggered the retry. Side effect only; it runs
/// synchronously on the retry loop and must not block for long.
pub type RetryObserver = Arc<dyn Fn(u32, Duration, &OpError) + Send + Sync>;

/// Configuration for a retry-driven execution.
#[derive(Clone)]
pub struct RetryPolicy {
    /// Maximum attempts made in total (default: 3).
    pub max_retries: u32,
    /// Name of the logical unit of work, used in wrapping and logs.
    pub operation_name: String,
    /// Optional observer invoked before each wait.
    on_retry: Option<RetryObserver>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            operation_name: "unknown".to_string(),
            on_retry: None,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum total attempts.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the operation name.
    #[must_use]
    pub fn with_operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = name.into();
        self
    }

    /// Sets the retry observer.
    #[must_use]
    pub fn with_on_retry(mut self, observer: RetryObserver) -> Self {
        self.on_retry = Some(observer);
        self
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("operation_name", &self.operation_name)
            .field("on_retry", &self.on_retry.as_ref().map(|_| "<observer>"))
            .finish()
    }
}

/// Per-invocation retry state, owned by a single
/// [`execute_with_retry`] call and dropped when it returns.
#[derive(Debug)]
pub struct RetrySession {
    attempts_made: u32,
    last_failure: Option<OpError>,
    max_attempts: u32,
    operation_name: String,
}

impl RetrySession {
    fn new(policy: &RetryPolicy) -> Self {
        Self {
            attempts_made: 0,
            last_failure: None,
            max_attempts: policy.max_retries,
            operation_name: policy.operation_name.clone(),
        }
    }

    fn record_failure(&mut self, failure: &OpError) {
        self.attempts_made += 1;
        self.last_failure = Some(failure.clone());
    }

    fn exhausted(&self) -> bool {
        self.attempts_made >= self.max_attempts
    }

    /// Returns the number of failed attempts recorded so far.
    #[must_use]
    pub const fn attempts_made(&self) -> u32 {
        self.attempts_made
    }

    /// Returns the most recent failure, if any.
    #[must_use]
    pub const fn last_failure(&self) -> Option<&OpError> {
        self.last_failure.as_ref()
    }

    /// Returns the name of the unit of work being retried.
    #[must_use]
    pub fn operation_name(&self) -> &str {
        &self.operation_name
    }
}

/// Executes an operation with bounded retry and deterministic backoff.
///
/// The operation may fail with any error; failures that downcast to
/// [`OpError`] are classified, everything else is wrapped once as
/// [`RetryError::Unexpected`] and never retried. Non-retryable
/// classified failures short-circuit with zero wait. Retryable ones are
/// re-attempted up to `policy.max_retries` total attempts, sleeping per
/// the backoff schedule between attempts; the sleep is raced against
/// `cancel`, and cancellation surfaces as [`RetryError::Cancelled`].
///
/// On exhaustion the last attempt's failure propagates unchanged, so
/// callers can still inspect its code and operation.
///
/// # Errors
///
/// Returns the terminal [`RetryError`] described above.
pub async fn execute_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, anyhow::Error>>,
{
    let mut session = RetrySession::new(policy);

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let failure = match err.downcast::<OpError>() {
                    Ok(failure) => failure,
                    Err(other) => {
                        tracing::error!(
                            operation = %session.operation_name(),
                            error = %other,
                            "unrecognized failure, not retrying"
                        );
                        return Err(RetryError::Unexpected {
                            operation: session.operation_name().to_string(),
                            source: other,
                        });
                    }
                };

                if !is_retryable(&failure) {
                    return Err(RetryError::Op(failure));
                }

                session.record_failure(&failure);
                if session.exhausted() {
                    tracing::warn!(
                        operation = %session.operation_name(),
                        attempts = session.attempts_made(),
                        code = failure.code(),
                        "retries exhausted"
                    );
                    return Err(RetryError::Op(failure));
                }

                let wait = compute_wait(session.attempts_made(), &failure);
                if let Some(observer) = policy.on_retry.as_ref() {
                    observer(session.attempts_made(), wait, &failure);
                }
                tracing::warn!(
                    operation = %session.operation_name(),
                    attempt = session.attempts_made(),
                    wait_ms = wait.as_millis() as u64,
                    code = failure.code(),
                    "retrying after failure"
                );

                tokio::select! {
                    () = cancel.cancelled() => {
                        return Err(RetryError::Cancelled {
                            operation: session.operation_name().to_string(),
                            reason: cancel.reason(),
                        });
                    }
                    () = tokio::time::sleep(wait) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn policy(name: &str) -> RetryPolicy {
        RetryPolicy::new().with_operation_name(name)
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = execute_with_retry(&policy("first_try"), &CancellationToken::new(), || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, anyhow::Error>(42)
            }
        })
        .await;

        assert_eq!(result.ok(), Some(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_retryable_failure_short_circuits() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let start = std::time::Instant::now();
        let result: Result<u32, RetryError> =
            execute_with_retry(&policy("create_user"), &CancellationToken::new(), || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(OpError::validation("email is required", "create_user").into())
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // No backoff wait for non-retryable failures.
        assert!(start.elapsed() < Duration::from_millis(500));

        match result {
            Err(RetryError::Op(err)) => {
                assert_eq!(err.code(), "VALIDATION_ERROR");
                assert_eq!(err.operation(), "create_user");
            }
            other => panic!("expected Op(Validation), got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_recovers() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let observed = Arc::new(Mutex::new(Vec::new()));
        let observer_log = observed.clone();

        let policy = policy("load_orders").with_on_retry(Arc::new(move |attempt, wait, failure| {
            observer_log
                .lock()
                .push((attempt, wait, failure.code().to_string()));
        }));

        let start = Instant::now();
        let result = execute_with_retry(&policy, &CancellationToken::new(), || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(OpError::database("connection refused", "load_orders").into())
                } else {
                    Ok::<_, anyhow::Error>("loaded")
                }
            }
        })
        .await;

        assert_eq!(result.ok(), Some("loaded"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 5s after the first failure, 10s after the second.
        assert_eq!(start.elapsed(), Duration::from_millis(15_000));

        let observed = observed.lock();
        assert_eq!(
            *observed,
            vec![
                (1, Duration::from_millis(5_000), "DB_ERROR".to_string()),
                (2, Duration::from_millis(10_000), "DB_ERROR".to_string()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_surfaces_last_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<u32, RetryError> =
            execute_with_retry(&policy("fetch_quote"), &CancellationToken::new(), || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(OpError::external_api("upstream 503", "fetch_quote").into())
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(RetryError::Op(err)) => {
                assert_eq!(err.code(), "API_ERROR");
                assert_eq!(err.message(), "upstream 503");
                assert_eq!(err.operation(), "fetch_quote");
            }
            other => panic!("expected Op(ExternalApi), got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_waits_declared_window() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let start = Instant::now();
        let result = execute_with_retry(
            &policy("send_mail").with_max_retries(2),
            &CancellationToken::new(),
            || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    if n == 0 {
                        Err(OpError::rate_limit_after("quota exceeded", "send_mail", 45).into())
                    } else {
                        Ok::<_, anyhow::Error>(())
                    }
                }
            },
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(start.elapsed(), Duration::from_millis(45_000));
    }

    #[tokio::test]
    async fn test_unrecognized_failure_wrapped_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<u32, RetryError> =
            execute_with_retry(&policy("parse_config"), &CancellationToken::new(), || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(anyhow::anyhow!("file not found"))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        match result {
            Err(RetryError::Unexpected { operation, source }) => {
                assert_eq!(operation, "parse_config");
                assert!(source.to_string().contains("file not found"));
            }
            other => panic!("expected Unexpected, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_aborts_backoff_wait() {
        let token = CancellationToken::new();
        let canceller = token.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1_000)).await;
            canceller.cancel("shutdown");
        });

        let result: Result<u32, RetryError> =
            execute_with_retry(&policy("sync_inventory"), &token, || async {
                Err(OpError::timeout("deadline exceeded", "sync_inventory").into())
            })
            .await;

        match result {
            Err(RetryError::Cancelled { operation, reason }) => {
                assert_eq!(operation, "sync_inventory");
                assert_eq!(reason, Some("shutdown".to_string()));
            }
            other => panic!("expected Cancelled, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_logic_flag_does_not_trigger_retry() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<u32, RetryError> =
            execute_with_retry(&policy("apply_discount"), &CancellationToken::new(), || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(OpError::logic_with_retryable("stale cart", "apply_discount", true).into())
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(RetryError::Op(OpError::Logic { .. }))));
    }

    #[test]
    fn test_policy_debug_hides_observer() {
        let policy = RetryPolicy::new().with_on_retry(Arc::new(|_, _, _| {}));
        let debug = format!("{policy:?}");
        assert!(debug.contains("<observer>"));
    }

    #[test]
    fn test_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.operation_name, "unknown");
        assert!(policy.on_retry.is_none());
    }
}
