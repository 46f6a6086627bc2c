//! Tracing subscriber setup

use crate::config::LoggingConfig;
use crate::error::{FlowpointError, Result};
use tracing_subscriber::fmt;
use tracing_subscriber::EnvFilter;

/// Build the env filter for `config`
///
/// `RUST_LOG` wins over the configured level when it is set.
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| FlowpointError::Config(format!("Invalid log level '{}': {}", config.level, e))),
    }
}

/// Install the global subscriber
///
/// Formats: "compact" (default), "pretty", "json". Fails if a subscriber is
/// already installed.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = env_filter(config)?;
    let builder = fmt().with_env_filter(filter).with_ansi(config.colored);

    let installed = match config.format.as_str() {
        "json" => builder.json().try_init(),
        "pretty" => builder.pretty().try_init(),
        "compact" => builder.compact().try_init(),
        other => {
            return Err(FlowpointError::Config(format!(
                "Unknown log format '{}' (expected compact, pretty or json)",
                other
            )))
        }
    };

    installed.map_err(|e| FlowpointError::Config(format!("Failed to install logger: {}", e)))
}
