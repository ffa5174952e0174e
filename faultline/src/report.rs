//! Projects classified failures into log and API response records.
//!
//! Both projections are pure: writing the log record to a sink and
//! serializing the response onto a transport are the collaborator's
//! responsibility. Status resolution can be enriched by an external
//! error-code registry; the formatter works without one.

use crate::classify::{action_of, severity_of, Action, Severity};
use crate::errors::{OpError, RetryError, ISO_FORMAT};
use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Sentinel error code for failures outside the taxonomy.
pub const FALLBACK_ERROR_CODE: &str = "9999";

/// Message shown to clients when internal detail is suppressed.
const GENERIC_ERROR_MESSAGE: &str = "An unexpected error occurred";

/// How much internal detail formatted responses may expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportMode {
    /// Include original failure detail in fallback responses.
    Development,
    /// Suppress internal detail behind a generic message.
    #[default]
    Production,
}

/// A registry entry resolved from an embedded error code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// HTTP status the code maps to.
    pub http_status: u16,
    /// Category label for the code.
    pub category: String,
}

/// Lookup seam for an externally supplied error-code registry.
///
/// Implementations map a 4-digit code string to a status and category.
/// The formatter must work when no registry is supplied or a code does
/// not resolve.
pub trait ErrorCodeRegistry: Send + Sync {
    /// Resolves a 4-digit code, or `None` if unknown.
    fn lookup(&self, code: &str) -> Option<RegistryEntry>;
}

/// A registry backed by a static in-memory map.
#[derive(Debug, Clone, Default)]
pub struct StaticErrorCodeRegistry {
    entries: HashMap<String, RegistryEntry>,
}

impl StaticErrorCodeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry for a code.
    #[must_use]
    pub fn with_entry(
        mut self,
        code: impl Into<String>,
        http_status: u16,
        category: impl Into<String>,
    ) -> Self {
        self.entries.insert(
            code.into(),
            RegistryEntry {
                http_status,
                category: category.into(),
            },
        );
        self
    }
}

impl ErrorCodeRegistry for StaticErrorCodeRegistry {
    fn lookup(&self, code: &str) -> Option<RegistryEntry> {
        self.entries.get(code).cloned()
    }
}

/// Structured log record for a classified failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Correlation identifier for the logical request.
    pub workflow_id: String,
    /// Formatting time, ISO 8601.
    pub timestamp: String,
    /// Stable machine identifier of the failure kind.
    pub error_code: String,
    /// Human-readable description.
    pub error_message: String,
    /// The logical unit of work that failed.
    pub failed_method: String,
    /// Whether a repeated attempt may plausibly succeed.
    pub retry_possible: bool,
    /// Operational urgency.
    pub severity: Severity,
    /// Recommended remediation.
    pub action: Action,
}

/// Structured API response record for a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// Always `false`.
    pub success: bool,
    /// Correlation identifier for the logical request.
    pub workflow_id: String,
    /// Registry-resolved code when found, else the kind's own code.
    pub error_code: String,
    /// Human-readable description.
    pub message: String,
    /// Resolved HTTP-style status.
    pub status: u16,
    /// Registry category, when the embedded code resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// The logical unit of work that failed.
    pub failed_method: String,
    /// Whether a repeated attempt may plausibly succeed.
    pub retry_possible: bool,
    /// Operational urgency.
    pub severity: Severity,
    /// Recommended remediation.
    pub action_required: Action,
    /// Formatting time, ISO 8601 - not the failure's capture time.
    pub timestamp: String,
}

fn now_iso() -> String {
    Utc::now().format(ISO_FORMAT).to_string()
}

/// Extracts a registry code embedded in a failure message.
///
/// Best-effort scan for a parenthesized 4-digit token, optionally
/// prefixed with the `ERR-` marker, e.g. `(ERR-1042)` or `(1042)`.
#[must_use]
pub fn extract_embedded_code(message: &str) -> Option<String> {
    static CODE_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = CODE_PATTERN
        .get_or_init(|| Regex::new(r"\((?:ERR-)?(\d{4})\)").ok())
        .as_ref()?;

    pattern
        .captures(message)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Projects a failure into a structured log record.
#[must_use]
pub fn to_log_entry(failure: &OpError, workflow_id: &str) -> LogEntry {
    LogEntry {
        workflow_id: workflow_id.to_string(),
        timestamp: now_iso(),
        error_code: failure.code().to_string(),
        error_message: failure.message().to_string(),
        failed_method: failure.operation().to_string(),
        retry_possible: failure.retryable(),
        severity: severity_of(failure),
        action: action_of(failure),
    }
}

/// Projects a failure into a structured API response record.
///
/// Status precedence: a registry-resolved code embedded in the message
/// wins; then Validation maps to 400, Authentication to 401, the
/// rate-limit code to 429, and everything else to 500.
#[must_use]
pub fn to_api_response(
    failure: &OpError,
    workflow_id: &str,
    registry: Option<&dyn ErrorCodeRegistry>,
) -> ApiErrorResponse {
    let mut error_code = failure.code().to_string();
    let mut category = None;

    let resolved = registry.and_then(|registry| {
        let embedded = extract_embedded_code(failure.message())?;
        let entry = registry.lookup(&embedded)?;
        Some((embedded, entry))
    });

    let status = if let Some((embedded, entry)) = resolved {
        error_code = embedded;
        category = Some(entry.category);
        entry.http_status
    } else {
        match failure {
            OpError::Validation { .. } => 400,
            OpError::Authentication { .. } => 401,
            OpError::RateLimit { .. } => 429,
            _ => 500,
        }
    };

    ApiErrorResponse {
        success: false,
        workflow_id: workflow_id.to_string(),
        error_code,
        message: failure.message().to_string(),
        status,
        category,
        failed_method: failure.operation().to_string(),
        retry_possible: failure.retryable(),
        severity: severity_of(failure),
        action_required: action_of(failure),
        timestamp: now_iso(),
    }
}

/// Builds a same-shaped response for a failure outside the taxonomy.
///
/// The original detail is only exposed in [`ReportMode::Development`];
/// production responses carry a generic message.
#[must_use]
pub fn fallback_api_response(
    detail: &str,
    operation: &str,
    workflow_id: &str,
    mode: ReportMode,
) -> ApiErrorResponse {
    let message = match mode {
        ReportMode::Development => detail.to_string(),
        ReportMode::Production => GENERIC_ERROR_MESSAGE.to_string(),
    };

    ApiErrorResponse {
        success: false,
        workflow_id: workflow_id.to_string(),
        error_code: FALLBACK_ERROR_CODE.to_string(),
        message,
        status: 500,
        category: None,
        failed_method: operation.to_string(),
        retry_possible: false,
        severity: Severity::Medium,
        action_required: Action::Investigate,
        timestamp: now_iso(),
    }
}

/// Projects any terminal retry outcome into an API response record.
///
/// Classified failures go through [`to_api_response`]; wrapped
/// unexpected failures and cancellations go through the fallback path.
#[must_use]
pub fn to_api_response_any(
    error: &RetryError,
    workflow_id: &str,
    registry: Option<&dyn ErrorCodeRegistry>,
    mode: ReportMode,
) -> ApiErrorResponse {
    match error {
        RetryError::Op(failure) => to_api_response(failure, workflow_id, registry),
        RetryError::Unexpected { operation, source } => {
            fallback_api_response(&source.to_string(), operation, workflow_id, mode)
        }
        RetryError::Cancelled { operation, .. } => {
            fallback_api_response(&error.to_string(), operation, workflow_id, mode)
        }
    }
}
