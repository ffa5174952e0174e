//! # Faultline
//!
//! A failure-classification and automatic-retry layer for services
//! whose operations are liable to transient or permanent failure:
//! external API calls, database operations, validation.
//!
//! Faultline provides:
//!
//! - **A closed failure taxonomy**: seven typed kinds, each with a
//!   stable code and a fixed retryability
//! - **Pure classification**: severity and remediation action derived
//!   from the kind, exhaustively
//! - **Deterministic backoff**: exponential waits with a hard cap, or
//!   the upstream-declared window for rate limits
//! - **A bounded retry executor**: cancellable, observable, and
//!   guaranteed to surface the real last failure on exhaustion
//! - **Structured projections**: log and API response records ready
//!   for whatever sink or transport the caller controls
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use faultline::prelude::*;
//!
//! let policy = RetryPolicy::new()
//!     .with_max_retries(3)
//!     .with_operation_name("fetch_quote");
//! let cancel = CancellationToken::new();
//!
//! let quote = execute_with_retry(&policy, &cancel, || async {
//!     fetch_quote().await.map_err(Into::into)
//! })
//! .await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod backoff;
pub mod cancellation;
pub mod classify;
pub mod errors;
pub mod observability;
pub mod report;
pub mod retry;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::backoff::{compute_wait, BASE_DELAY_MS, MAX_DELAY_MS};
    pub use crate::cancellation::CancellationToken;
    pub use crate::classify::{action_of, is_retryable, severity_of, Action, Severity};
    pub use crate::errors::{OpError, RetryError};
    pub use crate::report::{
        fallback_api_response, to_api_response, to_api_response_any, to_log_entry,
        ApiErrorResponse, ErrorCodeRegistry, LogEntry, RegistryEntry, ReportMode,
        StaticErrorCodeRegistry,
    };
    pub use crate::retry::{execute_with_retry, RetryObserver, RetryPolicy, RetrySession};
}

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    // End-to-end: executor failure flowing into both projections.
    #[tokio::test(start_paused = true)]
    async fn failure_flows_from_executor_to_formatter() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let policy = RetryPolicy::new()
            .with_max_retries(2)
            .with_operation_name("fetch_quote");

        let result: Result<u32, RetryError> =
            execute_with_retry(&policy, &CancellationToken::new(), || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(OpError::external_api_with_status("upstream 503", "fetch_quote", 503)
                        .into())
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let err = match result {
            Err(err) => err,
            Ok(_) => panic!("expected failure"),
        };

        let response = to_api_response_any(&err, "wf-e2e", None, ReportMode::Production);
        assert_eq!(response.status, 500);
        assert_eq!(response.error_code, "API_ERROR");
        assert_eq!(response.failed_method, "fetch_quote");
        assert_eq!(response.action_required, Action::Retry);

        if let Some(failure) = err.as_op() {
            let entry = to_log_entry(failure, "wf-e2e");
            assert_eq!(entry.severity, Severity::Medium);
            assert!(entry.retry_possible);
        } else {
            panic!("expected a classified failure");
        }
    }
}
