//! Shared setup for integration tests.

use tracing_subscriber::EnvFilter;

/// Route engine logs to the test writer. Filter with `RUST_LOG`.
pub fn setup() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
