//! Pure classification of failures into severity and remediation action.
//!
//! Everything here is a total function over the closed [`OpError`] set,
//! dispatched by exhaustive match. No state, no side effects.

use crate::errors::OpError;
use serde::{Deserialize, Serialize};

/// Operational urgency of a failure, independent of retryability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// User must correct their input; no operator involvement.
    Low,
    /// Expected to self-resolve, typically via retry.
    Medium,
    /// Needs operational attention.
    High,
    /// Requires immediate operator action.
    Critical,
}

impl Severity {
    /// Returns the wire name of this severity.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Recommended remediation for a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// The caller must change their input.
    FixInput,
    /// A repeated attempt is the right response.
    Retry,
    /// Credentials need to be rotated or corrected.
    UpdateCredentials,
    /// The database connection needs checking.
    CheckDbConnection,
    /// No mechanical remediation; a human should look.
    Investigate,
}

impl Action {
    /// Returns the wire name of this action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FixInput => "fix_input",
            Self::Retry => "retry",
            Self::UpdateCredentials => "update_credentials",
            Self::CheckDbConnection => "check_db_connection",
            Self::Investigate => "investigate",
        }
    }
}

/// Maps a failure to its operational severity.
#[must_use]
pub const fn severity_of(failure: &OpError) -> Severity {
    match failure {
        OpError::Authentication { .. } => Severity::Critical,
        OpError::Database { .. } => Severity::High,
        OpError::Validation { .. } => Severity::Low,
        OpError::ExternalApi { .. }
        | OpError::Timeout { .. }
        | OpError::RateLimit { .. }
        | OpError::Logic { .. } => Severity::Medium,
    }
}

/// Maps a failure to its recommended remediation.
///
/// The retryable check deliberately precedes the Authentication and
/// Database arms. With the current kind table those two kinds are never
/// retryable so the ordering is unobservable, but it is part of the
/// documented contract and must not be reordered.
#[must_use]
pub fn action_of(failure: &OpError) -> Action {
    if matches!(failure, OpError::Validation { .. }) {
        return Action::FixInput;
    }
    if failure.retryable() {
        return Action::Retry;
    }
    match failure {
        OpError::Authentication { .. } => Action::UpdateCredentials,
        OpError::Database { .. } => Action::CheckDbConnection,
        _ => Action::Investigate,
    }
}

/// Decides whether the executor may automatically retry a failure.
///
/// The whitelist is a fixed set of four kinds. A `Logic` failure is
/// never auto-retried even when constructed with `retryable = true`;
/// its flag only feeds [`action_of`] and the reported records.
#[must_use]
pub const fn is_retryable(failure: &OpError) -> bool {
    matches!(
        failure,
        OpError::ExternalApi { .. }
            | OpError::Database { .. }
            | OpError::Timeout { .. }
            | OpError::RateLimit { .. }
    ) && failure.retryable()
}
