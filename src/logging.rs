//! Tracing subscriber setup for binaries and examples.

use tracing_subscriber::EnvFilter;

/// Install a formatting subscriber honoring `RUST_LOG`.
///
/// Call once at process start; later calls are ignored.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
