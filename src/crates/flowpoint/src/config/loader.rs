//! Configuration loader with dual-location support
//!
//! Loads configuration from:
//! 1. Default values
//! 2. User-level config: ~/.flowpoint/flowpoint.toml
//! 3. Project-level config: ./.flowpoint/flowpoint.toml
//! 4. Environment overrides (FLOWPOINT_DATABASE_PATH, FLOWPOINT_LOG_LEVEL)
//!
//! Later sources override earlier ones.

use crate::config::schema::FlowpointConfig;
use crate::error::{FlowpointError, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Name of the per-user and per-project configuration directory
pub const CONFIG_DIR_NAME: &str = ".flowpoint";

const CONFIG_FILE_NAME: &str = "flowpoint.toml";

/// Configuration loader that handles both user and project configs
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    user_dir: PathBuf,
    user_config_path: PathBuf,
    project_config_path: PathBuf,
}

impl ConfigLoader {
    /// Create a loader for the current user and working directory
    pub fn new() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| FlowpointError::Config("Cannot determine home directory".to_string()))?;
        let cwd = std::env::current_dir()?;

        Ok(Self::with_roots(home, cwd))
    }

    /// Create a loader rooted at explicit user and project directories
    pub fn with_roots(home: impl AsRef<Path>, project_root: impl AsRef<Path>) -> Self {
        let user_dir = home.as_ref().join(CONFIG_DIR_NAME);
        Self {
            user_config_path: user_dir.join(CONFIG_FILE_NAME),
            project_config_path: project_root
                .as_ref()
                .join(CONFIG_DIR_NAME)
                .join(CONFIG_FILE_NAME),
            user_dir,
        }
    }

    /// Load configuration from both locations with project taking precedence
    pub async fn load(&self) -> Result<FlowpointConfig> {
        let mut config = FlowpointConfig::default();

        if let Some(user_config) = self.load_from_path(&self.user_config_path).await? {
            debug!(path = %self.user_config_path.display(), "Loaded user-level config");
            config.merge(user_config);
        }

        if let Some(project_config) = self.load_from_path(&self.project_config_path).await? {
            debug!(path = %self.project_config_path.display(), "Loaded project-level config");
            config.merge(project_config);
        }

        config.apply_env_overrides();

        Ok(config)
    }

    /// Load configuration from a specific path; a missing file is not an error
    async fn load_from_path(&self, path: &Path) -> Result<Option<FlowpointConfig>> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not present");
            return Ok(None);
        }

        let content = fs::read_to_string(path)
            .await
            .map_err(|e| FlowpointError::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        let config: FlowpointConfig = toml::from_str(&content)
            .map_err(|e| FlowpointError::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

        Ok(Some(config))
    }

    /// Directory holding user-level state (~/.flowpoint)
    pub fn user_dir(&self) -> &Path {
        &self.user_dir
    }

    /// Get user config path
    pub fn user_config_path(&self) -> &Path {
        &self.user_config_path
    }

    /// Get project config path
    pub fn project_config_path(&self) -> &Path {
        &self.project_config_path
    }

    /// Write a default user config if none exists yet
    pub async fn write_default_user_config(&self) -> Result<bool> {
        if self.user_config_path.exists() {
            return Ok(false);
        }

        fs::create_dir_all(&self.user_dir).await?;
        let content = toml::to_string_pretty(&FlowpointConfig::default())
            .map_err(|e| FlowpointError::Config(format!("Failed to render default config: {}", e)))?;
        fs::write(&self.user_config_path, content).await?;

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_paths() {
        let loader = ConfigLoader::with_roots("/home/me", "/work/project");

        assert!(loader.user_config_path().ends_with(".flowpoint/flowpoint.toml"));
        assert!(loader.user_config_path().starts_with("/home/me"));
        assert!(loader.project_config_path().starts_with("/work/project"));
    }

    #[tokio::test]
    async fn test_load_returns_defaults_when_no_files() {
        let home = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        let loader = ConfigLoader::with_roots(home.path(), project.path());

        let config = loader.load().await.unwrap();
        assert_eq!(config.checkpoints.history_limit, 50);
        assert_eq!(config.logging.level, "info");
    }

    #[tokio::test]
    async fn test_project_overrides_user() {
        let home = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        let loader = ConfigLoader::with_roots(home.path(), project.path());

        fs::create_dir_all(loader.user_dir()).await.unwrap();
        fs::write(
            loader.user_config_path(),
            r#"
[checkpoints]
history_limit = 10
"#,
        )
        .await
        .unwrap();

        fs::create_dir_all(project.path().join(CONFIG_DIR_NAME)).await.unwrap();
        fs::write(
            loader.project_config_path(),
            r#"
[checkpoints]
history_limit = 25
"#,
        )
        .await
        .unwrap();

        let config = loader.load().await.unwrap();
        assert_eq!(config.checkpoints.history_limit, 25);
    }

    #[tokio::test]
    async fn test_malformed_config_is_an_error() {
        let home = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        let loader = ConfigLoader::with_roots(home.path(), project.path());

        fs::create_dir_all(loader.user_dir()).await.unwrap();
        fs::write(loader.user_config_path(), "[checkpoints\nhistory_limit = ")
            .await
            .unwrap();

        let err = loader.load().await.unwrap_err();
        assert!(matches!(err, FlowpointError::Config(_)));
    }

    #[tokio::test]
    async fn test_write_default_user_config_once() {
        let home = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        let loader = ConfigLoader::with_roots(home.path(), project.path());

        assert!(loader.write_default_user_config().await.unwrap());
        assert!(!loader.write_default_user_config().await.unwrap());

        let config = loader.load().await.unwrap();
        assert_eq!(config.database.path, "flowpoint.db");
    }
}
