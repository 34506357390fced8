//! Logging setup for harness runs
//!
//! Plain tracing to stderr, filtered by `RUST_LOG`. Lifecycle transitions log
//! at `info`, absorbed probe errors at `debug`, and swallowed teardown
//! failures at `warn`, so `RUST_LOG=sfn_e2e=debug` shows every poll.
//!
//! # Example
//!
//! ```no_run
//! use sfn_e2e::telemetry::init_logging;
//!
//! init_logging();
//! ```

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber
///
/// Safe to call from every test: only the first call installs anything.
pub fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}
