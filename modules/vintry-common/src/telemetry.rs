// Tracing setup shared by binaries and integration tests.

use tracing_subscriber::EnvFilter;

/// Initialize structured logging. Respects RUST_LOG, defaulting the vintry
/// crates to info.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("vintry=info".parse().expect("valid directive")),
        )
        .init();
}

/// Test variant: never panics when a subscriber is already installed
/// (integration tests share one process).
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
