//! Tracing subscriber bootstrap for binaries and tests.
//!
//! The core only emits through `tracing` macros; installing a
//! subscriber is opt-in for the hosting process. Log sinks themselves
//! remain the collaborator's responsibility.

use tracing_subscriber::EnvFilter;

/// Installs a global fmt subscriber.
///
/// Uses `filter` as the directive string when given, otherwise falls
/// back to `RUST_LOG` and then to `info`. Safe to call more than once;
/// later calls are no-ops.
pub fn init_tracing(filter: Option<&str>) {
    let filter = filter.map_or_else(
        || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        EnvFilter::new,
    );

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing(Some("debug"));
        init_tracing(Some("info"));
        // Second call must not panic.
    }
}
