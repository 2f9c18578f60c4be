//! Logging setup for binaries and tests embedding the client.
use tracing_subscriber::{fmt, EnvFilter};

/// Installs a global fmt subscriber. `RUST_LOG` wins over `default_directive`.
/// Returns `false` when a subscriber was already installed.
pub fn init_tracing(default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    fmt().with_env_filter(filter).with_target(false).try_init().is_ok()
}
