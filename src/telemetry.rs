//! Tracing setup for applications embedding the history engine.

use crate::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber. `RUST_LOG` wins over the configured level.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
