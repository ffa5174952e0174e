//! The closed failure taxonomy and the executor's terminal error type.
//!
//! Every failure this layer recognizes is one of the seven [`OpError`]
//! variants. The set is deliberately closed: the classifier and the
//! formatter dispatch over it with exhaustive matches, so adding a kind
//! is a compile-visible change everywhere it matters.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;

/// ISO 8601 format used for every timestamp this crate emits.
pub(crate) const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f+00:00";

/// Default quota window reported by rate-limiting upstreams, in seconds.
pub const DEFAULT_RETRY_AFTER_SECONDS: u64 = 30;

/// A classified operation failure.
///
/// Instances are immutable after construction and construction cannot
/// fail. `retryable` is fixed by the variant for every kind except
/// [`OpError::Logic`], where the caller decides at construction.
#[derive(Debug, Clone, Error)]
pub enum OpError {
    /// Caller input failed validation; retrying cannot help.
    #[error("validation failed in '{operation}': {message}")]
    Validation {
        /// Human-readable description.
        message: String,
        /// The logical unit of work that failed.
        operation: String,
        /// Capture time, set once at construction.
        created_at: DateTime<Utc>,
    },

    /// An upstream API call failed; the upstream may recover.
    #[error("external API call failed in '{operation}': {message}")]
    ExternalApi {
        /// Human-readable description.
        message: String,
        /// The logical unit of work that failed.
        operation: String,
        /// Status code reported by the upstream, when known.
        status_code: Option<u16>,
        /// Capture time, set once at construction.
        created_at: DateTime<Utc>,
    },

    /// A database operation failed; connection blips are possible.
    #[error("database operation failed in '{operation}': {message}")]
    Database {
        /// Human-readable description.
        message: String,
        /// The logical unit of work that failed.
        operation: String,
        /// Capture time, set once at construction.
        created_at: DateTime<Utc>,
    },

    /// Credentials were rejected; they must be fixed, not retried.
    #[error("authentication failed in '{operation}': {message}")]
    Authentication {
        /// Human-readable description.
        message: String,
        /// The logical unit of work that failed.
        operation: String,
        /// Capture time, set once at construction.
        created_at: DateTime<Utc>,
    },

    /// The operation exceeded its deadline; a later attempt may succeed.
    #[error("operation '{operation}' timed out: {message}")]
    Timeout {
        /// Human-readable description.
        message: String,
        /// The logical unit of work that failed.
        operation: String,
        /// Capture time, set once at construction.
        created_at: DateTime<Utc>,
    },

    /// An upstream quota was exhausted; succeeds after the window resets.
    #[error("rate limit hit in '{operation}': {message}")]
    RateLimit {
        /// Human-readable description.
        message: String,
        /// The logical unit of work that failed.
        operation: String,
        /// Seconds until the quota window resets.
        retry_after_seconds: u64,
        /// Capture time, set once at construction.
        created_at: DateTime<Utc>,
    },

    /// A business-rule failure; the application decides retryability.
    #[error("logic error in '{operation}': {message}")]
    Logic {
        /// Human-readable description.
        message: String,
        /// The logical unit of work that failed.
        operation: String,
        /// Whether a repeated attempt may plausibly succeed.
        retryable: bool,
        /// Capture time, set once at construction.
        created_at: DateTime<Utc>,
    },
}

impl OpError {
    /// Creates a validation failure.
    #[must_use]
    pub fn validation(message: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            operation: operation.into(),
            created_at: Utc::now(),
        }
    }

    /// Creates an external API failure with no upstream status.
    #[must_use]
    pub fn external_api(message: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::ExternalApi {
            message: message.into(),
            operation: operation.into(),
            status_code: None,
            created_at: Utc::now(),
        }
    }

    /// Creates an external API failure carrying the upstream status code.
    #[must_use]
    pub fn external_api_with_status(
        message: impl Into<String>,
        operation: impl Into<String>,
        status_code: u16,
    ) -> Self {
        Self::ExternalApi {
            message: message.into(),
            operation: operation.into(),
            status_code: Some(status_code),
            created_at: Utc::now(),
        }
    }

    /// Creates a database failure.
    #[must_use]
    pub fn database(message: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
            operation: operation.into(),
            created_at: Utc::now(),
        }
    }

    /// Creates an authentication failure.
    #[must_use]
    pub fn authentication(message: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
            operation: operation.into(),
            created_at: Utc::now(),
        }
    }

    /// Creates a timeout failure.
    #[must_use]
    pub fn timeout(message: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
            operation: operation.into(),
            created_at: Utc::now(),
        }
    }

    /// Creates a rate-limit failure with the default 30 second window.
    #[must_use]
    pub fn rate_limit(message: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::rate_limit_after(message, operation, DEFAULT_RETRY_AFTER_SECONDS)
    }

    /// Creates a rate-limit failure with an explicit reset window.
    #[must_use]
    pub fn rate_limit_after(
        message: impl Into<String>,
        operation: impl Into<String>,
        retry_after_seconds: u64,
    ) -> Self {
        Self::RateLimit {
            message: message.into(),
            operation: operation.into(),
            retry_after_seconds,
            created_at: Utc::now(),
        }
    }

    /// Creates a non-retryable logic failure.
    #[must_use]
    pub fn logic(message: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::logic_with_retryable(message, operation, false)
    }

    /// Creates a logic failure with caller-specified retryability.
    #[must_use]
    pub fn logic_with_retryable(
        message: impl Into<String>,
        operation: impl Into<String>,
        retryable: bool,
    ) -> Self {
        Self::Logic {
            message: message.into(),
            operation: operation.into(),
            retryable,
            created_at: Utc::now(),
        }
    }

    /// Returns the stable machine identifier for this failure kind.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::ExternalApi { .. } => "API_ERROR",
            Self::Database { .. } => "DB_ERROR",
            Self::Authentication { .. } => "AUTH_ERROR",
            Self::Timeout { .. } => "TIMEOUT_ERROR",
            Self::RateLimit { .. } => "RATE_LIMIT_ERROR",
            Self::Logic { .. } => "LOGIC_ERROR",
        }
    }

    /// Returns the human-readable description.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Validation { message, .. }
            | Self::ExternalApi { message, .. }
            | Self::Database { message, .. }
            | Self::Authentication { message, .. }
            | Self::Timeout { message, .. }
            | Self::RateLimit { message, .. }
            | Self::Logic { message, .. } => message,
        }
    }

    /// Returns the logical unit of work that failed.
    #[must_use]
    pub fn operation(&self) -> &str {
        match self {
            Self::Validation { operation, .. }
            | Self::ExternalApi { operation, .. }
            | Self::Database { operation, .. }
            | Self::Authentication { operation, .. }
            | Self::Timeout { operation, .. }
            | Self::RateLimit { operation, .. }
            | Self::Logic { operation, .. } => operation,
        }
    }

    /// Returns whether a repeated attempt may plausibly succeed.
    ///
    /// Fixed per variant; only `Logic` carries a caller-chosen flag.
    #[must_use]
    pub const fn retryable(&self) -> bool {
        match self {
            Self::Validation { .. } | Self::Authentication { .. } => false,
            Self::ExternalApi { .. }
            | Self::Database { .. }
            | Self::Timeout { .. }
            | Self::RateLimit { .. } => true,
            Self::Logic { retryable, .. } => *retryable,
        }
    }

    /// Returns the capture time.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        match self {
            Self::Validation { created_at, .. }
            | Self::ExternalApi { created_at, .. }
            | Self::Database { created_at, .. }
            | Self::Authentication { created_at, .. }
            | Self::Timeout { created_at, .. }
            | Self::RateLimit { created_at, .. }
            | Self::Logic { created_at, .. } => *created_at,
        }
    }

    /// Returns the upstream status code for external API failures.
    #[must_use]
    pub const fn status_code(&self) -> Option<u16> {
        match self {
            Self::ExternalApi { status_code, .. } => *status_code,
            _ => None,
        }
    }

    /// Returns the quota reset window for rate-limit failures.
    #[must_use]
    pub const fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            Self::RateLimit {
                retry_after_seconds,
                ..
            } => Some(*retry_after_seconds),
            _ => None,
        }
    }

    /// Converts to a dictionary representation.
    ///
    /// Always contains `error_code`, `error_message`, `failed_method`,
    /// `retry_possible` and `timestamp`. External API failures add
    /// `status_code` when the upstream reported one; rate-limit failures
    /// add `retry_after`.
    #[must_use]
    pub fn to_record(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("error_code".to_string(), serde_json::json!(self.code()));
        map.insert(
            "error_message".to_string(),
            serde_json::json!(self.message()),
        );
        map.insert(
            "failed_method".to_string(),
            serde_json::json!(self.operation()),
        );
        map.insert(
            "retry_possible".to_string(),
            serde_json::json!(self.retryable()),
        );
        map.insert(
            "timestamp".to_string(),
            serde_json::json!(self.created_at().format(ISO_FORMAT).to_string()),
        );

        match self {
            Self::ExternalApi {
                status_code: Some(status),
                ..
            } => {
                map.insert("status_code".to_string(), serde_json::json!(status));
            }
            Self::RateLimit {
                retry_after_seconds,
                ..
            } => {
                map.insert(
                    "retry_after".to_string(),
                    serde_json::json!(retry_after_seconds),
                );
            }
            _ => {}
        }

        map
    }
}

/// Terminal outcome of a retry-driven execution.
#[derive(Debug, Error)]
pub enum RetryError {
    /// A classified failure propagated unchanged from the last attempt.
    #[error(transparent)]
    Op(#[from] OpError),

    /// A failure outside the taxonomy, wrapped once and never retried.
    #[error("unexpected failure in '{operation}': {source}")]
    Unexpected {
        /// The logical unit of work that failed.
        operation: String,
        /// The underlying error.
        #[source]
        source: anyhow::Error,
    },

    /// The backoff wait was aborted through the cancellation token.
    #[error("operation '{operation}' cancelled: {}", reason.as_deref().unwrap_or("no reason given"))]
    Cancelled {
        /// The logical unit of work that was cancelled.
        operation: String,
        /// The cancellation reason, if one was supplied.
        reason: Option<String>,
    },
}

impl RetryError {
    /// Returns the inner classified failure, if this is one.
    #[must_use]
    pub const fn as_op(&self) -> Option<&OpError> {
        match self {
            Self::Op(err) => Some(err),
            _ => None,
        }
    }
}
