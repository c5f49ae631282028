//! Tracing subscriber setup
//!
//! `RUST_LOG` wins over the configured level when it is set.

use crate::config::MonitoringConfig;
use crate::error::{Error, Result};
use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber and apply the metrics switch
///
/// Fails if a global subscriber is already installed, so hosts that
/// bring their own subscriber can ignore the error.
pub fn init(config: &MonitoringConfig) -> Result<()> {
    crate::metrics::configure(config);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let installed = if config.structured_logging {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| Error::Configuration(format!("Failed to install logger: {}", e)))
}
