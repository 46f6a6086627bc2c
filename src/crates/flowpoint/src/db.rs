//! Database connection and migrations
//!
//! Provides the SQLite connection pool shared by the checkpoint manager and
//! the tools that mutate business tables, plus the embedded schema for the
//! `checkpoints` and `undo_log` tables.

use crate::config::DatabaseConfig;
use crate::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Type alias for the database connection pool
pub type DatabasePool = SqlitePool;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database connection wrapper
#[derive(Clone, Debug)]
pub struct Database {
    pool: Arc<DatabasePool>,
}

impl Database {
    /// Open (creating if needed) the SQLite database at `database_path`
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        Self::open(
            database_path.as_ref(),
            DEFAULT_MAX_CONNECTIONS,
            DEFAULT_BUSY_TIMEOUT,
        )
        .await
    }

    /// Open the database described by a [`DatabaseConfig`]
    ///
    /// `base_dir` resolves relative paths.
    pub async fn from_config(config: &DatabaseConfig, base_dir: &Path) -> Result<Self> {
        let path = config.resolve_path(base_dir);

        Self::open(
            &path,
            config.max_connections,
            Duration::from_millis(config.busy_timeout_ms),
        )
        .await
    }

    async fn open(path: &Path, max_connections: u32, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        debug!(path = %path.display(), max_connections, "Connecting to database");

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        info!(path = %path.display(), "Database connection established");

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    /// Run the embedded migrations
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(self.pool.as_ref())
            .await?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Perform a health check by running a simple query
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    /// Close the database connection
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database connection closed");
    }

    /// Open the database and apply all migrations
    pub async fn initialize<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let db = Self::new(database_path).await?;
        db.run_migrations().await?;
        Ok(db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_initialize_creates_schema() {
        let dir = TempDir::new().unwrap();
        let db = Database::initialize(dir.path().join("nested/flowpoint.db"))
            .await
            .unwrap();

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name IN ('cases', 'checkpoints', 'undo_log') ORDER BY name",
        )
        .fetch_all(db.pool())
        .await
        .unwrap();

        let names: Vec<String> = tables.into_iter().map(|(n,)| n).collect();
        assert_eq!(names, vec!["cases", "checkpoints", "undo_log"]);
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let dir = TempDir::new().unwrap();
        let db = Database::initialize(dir.path().join("flowpoint.db"))
            .await
            .unwrap();

        assert!(db.run_migrations().await.is_ok());
        assert!(db.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn test_foreign_keys_enabled() {
        let dir = TempDir::new().unwrap();
        let db = Database::initialize(dir.path().join("flowpoint.db"))
            .await
            .unwrap();

        let (enabled,): (i64,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(enabled, 1);
    }

    #[tokio::test]
    async fn test_from_config_resolves_relative_path() {
        let dir = TempDir::new().unwrap();
        let config = DatabaseConfig {
            path: "relative.db".to_string(),
            max_connections: 2,
            busy_timeout_ms: 1000,
        };

        let db = Database::from_config(&config, dir.path()).await.unwrap();
        assert!(db.health_check().await.is_ok());
        assert!(dir.path().join("relative.db").exists());
    }
}
