//! Tracing subscriber setup
//!
//! The router only emits `tracing` events. Hosts that do not install their
//! own subscriber can call [`init_logging`] once at startup.

use crate::config::LoggingConfig;
use crate::utils::error::{GatewayError, Result};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber
///
/// `RUST_LOG` takes precedence over `config.level`. Calling this more than
/// once is harmless; later calls leave the first subscriber in place.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| {
            GatewayError::config(format!("Invalid log filter '{}': {}", config.level, e))
        })?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target)
        .with_thread_ids(false);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if let Err(e) = installed {
        debug!("Tracing subscriber already installed: {}", e);
    }

    Ok(())
}
