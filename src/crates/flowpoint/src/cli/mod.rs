//! CLI command implementations
//!
//! Provides command handlers for the flowpoint binary.

pub mod checkpoint;

use crate::config::{ConfigLoader, FlowpointConfig};
use crate::db::Database;
use crate::error::Result;
use crate::manager::CheckpointManager;
use colored::Colorize;
use tracing::info;

/// Open the configured database, apply migrations, and build a manager
pub async fn open_manager(loader: &ConfigLoader, config: &FlowpointConfig) -> Result<CheckpointManager> {
    let db = Database::from_config(&config.database, loader.user_dir()).await?;
    db.run_migrations().await?;

    Ok(CheckpointManager::with_config(db, &config.checkpoints))
}

/// Handle `init` command
///
/// Writes a default user config (unless one exists) and creates the schema.
pub async fn handle_init(loader: &ConfigLoader, config: &FlowpointConfig) -> Result<()> {
    let wrote_config = loader.write_default_user_config().await?;
    let manager = open_manager(loader, config).await?;
    manager.database().health_check().await?;

    info!(config = %loader.user_config_path().display(), wrote_config, "Initialized");

    println!("{}", "✓ flowpoint initialized".green().bold());
    if wrote_config {
        println!("  Configuration: {} (created)", loader.user_config_path().display());
    } else {
        println!("  Configuration: {} (kept)", loader.user_config_path().display());
    }
    println!(
        "  Database: {}",
        config.database_path(loader.user_dir()).display()
    );

    manager.database().close().await;
    Ok(())
}
