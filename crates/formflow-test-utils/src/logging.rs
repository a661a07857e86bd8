//! Tracing setup for tests.

use tracing_subscriber::EnvFilter;

/// Initialize tracing for tests.
///
/// Honors `RUST_LOG` when set and otherwise logs formflow crates at debug.
/// Safe to call from every test; only the first call installs a subscriber.
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("formflow_core=debug,formflow_state_file=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
