//! Configuration management for flowpoint
//!
//! Supports dual-location configuration:
//! - User-level: ~/.flowpoint/flowpoint.toml
//! - Project-level: ./.flowpoint/flowpoint.toml
//!
//! Project-level config overrides user-level config.

mod loader;
mod schema;

pub use loader::ConfigLoader;
pub use schema::{
    CheckpointConfig, DatabaseConfig, ExecutionConfig, FlowpointConfig, LoggingConfig,
};

use crate::Result;

/// Load configuration from both locations with project config taking precedence
pub async fn load_config() -> Result<FlowpointConfig> {
    let loader = ConfigLoader::new()?;
    loader.load().await
}
