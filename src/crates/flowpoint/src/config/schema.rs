//! Configuration schema for flowpoint

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding `database.path`
pub const DATABASE_PATH_ENV: &str = "FLOWPOINT_DATABASE_PATH";

/// Environment variable overriding `logging.level`
pub const LOG_LEVEL_ENV: &str = "FLOWPOINT_LOG_LEVEL";

/// Main flowpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FlowpointConfig {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Checkpoint history configuration
    #[serde(default)]
    pub checkpoints: CheckpointConfig,

    /// Tool execution configuration
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database file path (relative to ~/.flowpoint or absolute)
    pub path: String,

    /// Maximum pooled connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a writer waits on a locked database before failing
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

impl DatabaseConfig {
    /// Resolve `path` to a file path
    ///
    /// A leading `sqlite://` or `sqlite:` scheme is dropped. Relative paths
    /// resolve against `base_dir`.
    pub fn resolve_path(&self, base_dir: &Path) -> PathBuf {
        let raw = self
            .path
            .strip_prefix("sqlite://")
            .or_else(|| self.path.strip_prefix("sqlite:"))
            .unwrap_or(&self.path);
        let path = PathBuf::from(raw);

        if path.is_absolute() {
            path
        } else {
            base_dir.join(path)
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "flowpoint.db".to_string(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

/// Checkpoint history configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Maximum number of checkpoints returned by history queries
    #[serde(default = "default_history_limit")]
    pub history_limit: u32,
}

fn default_history_limit() -> u32 {
    50
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
        }
    }
}

/// Tool execution configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExecutionConfig {
    /// Dispatch the tool calls of a batch concurrently instead of in order
    #[serde(default)]
    pub concurrent_tools: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,

    /// Log format: "compact", "pretty", "json"
    pub format: String,

    /// Enable colored output
    pub colored: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
            colored: true,
        }
    }
}

impl FlowpointConfig {
    /// Merge another config into this one (other takes precedence)
    ///
    /// The loader handles priority: defaults → user → project
    pub fn merge(&mut self, other: FlowpointConfig) {
        // serde fills in defaults for sections missing from `other`
        self.database = other.database;
        self.checkpoints = other.checkpoints;
        self.execution = other.execution;
        self.logging = other.logging;
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var(DATABASE_PATH_ENV) {
            if !path.trim().is_empty() {
                self.database.path = path;
            }
        }

        if let Ok(level) = std::env::var(LOG_LEVEL_ENV) {
            if !level.trim().is_empty() {
                self.logging.level = level;
            }
        }
    }

    /// Get the resolved database path
    ///
    /// Relative paths resolve against `base_dir` (normally ~/.flowpoint).
    pub fn database_path(&self, base_dir: &Path) -> PathBuf {
        self.database.resolve_path(base_dir)
    }
}
