//! Deterministic backoff schedule for retry waits.
//!
//! No jitter is applied: the schedule is fully deterministic, which
//! keeps tests exact at the cost of thundering-herd risk under
//! concurrent callers. This module does not coordinate across callers.

use crate::errors::OpError;
use std::time::Duration;

/// Base delay for the exponential schedule, in milliseconds.
pub const BASE_DELAY_MS: u64 = 5_000;

/// Cap on the exponential schedule, in milliseconds.
pub const MAX_DELAY_MS: u64 = 60_000;

/// Computes the wait before the next attempt.
///
/// `attempt` is 1-indexed: it is the number of failures observed so
/// far, so the first wait uses exponent 0 (5s), the second exponent 1
/// (10s), and so on up to the 60s cap.
///
/// Rate-limit failures bypass the exponential schedule entirely and
/// wait exactly the upstream-declared reset window, uncapped.
#[must_use]
pub fn compute_wait(attempt: u32, failure: &OpError) -> Duration {
    if let Some(retry_after) = failure.retry_after_seconds() {
        return Duration::from_millis(retry_after.saturating_mul(1_000));
    }

    let exponent = attempt.saturating_sub(1);
    let delay = BASE_DELAY_MS
        .saturating_mul(2u64.saturating_pow(exponent))
        .min(MAX_DELAY_MS);
    Duration::from_millis(delay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_exponential_schedule() {
        let failure = OpError::timeout("deadline exceeded", "run_report");

        assert_eq!(compute_wait(1, &failure), Duration::from_millis(5_000));
        assert_eq!(compute_wait(2, &failure), Duration::from_millis(10_000));
        assert_eq!(compute_wait(3, &failure), Duration::from_millis(20_000));
        assert_eq!(compute_wait(4, &failure), Duration::from_millis(40_000));
    }

    #[test]
    fn test_exponential_capped_at_max() {
        let failure = OpError::timeout("deadline exceeded", "run_report");

        assert_eq!(compute_wait(5, &failure), Duration::from_millis(60_000));
        assert_eq!(compute_wait(10, &failure), Duration::from_millis(60_000));
        assert_eq!(compute_wait(u32::MAX, &failure), Duration::from_millis(60_000));
    }

    #[test]
    fn test_rate_limit_uses_declared_window() {
        let failure = OpError::rate_limit("quota exceeded", "send_mail");

        // Same wait regardless of attempt number, no cap applied.
        for attempt in [1, 2, 10, 100] {
            assert_eq!(
                compute_wait(attempt, &failure),
                Duration::from_millis(30_000)
            );
        }
    }

    #[test]
    fn test_rate_limit_window_exceeding_cap_is_not_clamped() {
        let failure = OpError::rate_limit_after("quota exceeded", "send_mail", 300);
        assert_eq!(compute_wait(1, &failure), Duration::from_millis(300_000));
    }

    #[test]
    fn test_other_kinds_use_exponential_schedule() {
        for failure in [
            OpError::external_api("upstream 503", "fetch_quote"),
            OpError::database("connection refused", "load_orders"),
        ] {
            assert_eq!(compute_wait(1, &failure), Duration::from_millis(5_000));
            assert_eq!(compute_wait(2, &failure), Duration::from_millis(10_000));
        }
    }
}
