//! `tracing-subscriber` wiring: `RUST_LOG`-filtered, JSON in the default
//! configuration so log lines are structured the same way whether they
//! come from a worker thread in a `MemoryTransport` or a saga orchestrator.

use tracing_subscriber::EnvFilter;

/// Initialize tracing for the process using `RUST_LOG`, defaulting to
/// `info`. Safe to call more than once; later calls are no-ops.
pub fn init() {
    init_with_filter("info");
}

/// Initialize tracing for the process, falling back to `default_filter`
/// when `RUST_LOG` isn't set. Safe to call more than once; later calls are
/// no-ops.
pub fn init_with_filter(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}
