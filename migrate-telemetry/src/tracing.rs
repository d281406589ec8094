use std::sync::Once;

use tracing_subscriber::EnvFilter;

// Subscriber installation is global and can only happen once per process.
// Tests call [`init_test_tracing`] from many test functions, so the guard is
// essential there.
static INIT: Once = Once::new();

/// Initializes the global tracing subscriber for a binary.
///
/// The filter is taken from `RUST_LOG`, defaulting to `info` for the whole
/// process when unset.
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .init();
    });
}

/// Initializes tracing for tests.
///
/// Uses the test writer so output is captured per test, and is safe to call
/// from every test function.
pub fn init_test_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
            )
            .with_test_writer()
            .init();
    });
}
