//! # Logging
//!
//! `tracing` subscriber setup. Library code only emits events; binaries and
//! tests choose where they go.

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global `fmt` subscriber.
///
/// # Environment
///
/// - `RUST_LOG`: filter directives (default `info`),
///   e.g. `RUST_LOG=debug` or `RUST_LOG=clima_core::orchestrator=trace`
///
/// ```no_run
/// clima_core::logging::init();
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_line_number(true)
        .init();
}

/// Subscriber for tests: debug level, captured by the test harness.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
