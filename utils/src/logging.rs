//! Minimal tracing setup for tools that do not need the node's log formats.

use tracing_subscriber::EnvFilter;

/// Install a plain `fmt` subscriber filtered by `RUST_LOG`, falling back to
/// `default_level` when the variable is unset or invalid.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_tracing(default_level: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}
