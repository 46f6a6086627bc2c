//! # flowpoint - Checkpoints for LLM-driven edits
//!
//! Groups the many small, independently committed statements an LLM tool
//! loop makes into one logical transaction that can be reverted as a unit.
//! Every mutation's pre-image is written to an undo log under a checkpoint;
//! rolling back replays compensating statements in reverse order inside a
//! single database transaction.
//!
//! ## Features
//!
//! - **Checkpoint Manager** - begin, log, commit, roll back, restore
//! - **Undo Log** - per-checkpoint, strictly ordered pre-images
//! - **Tool Integration** - single-slot sessions and a batch runner that
//!   commits on success and rolls back on failure or cancellation
//! - **SQLite Storage** - embedded migrations, `~/.flowpoint/flowpoint.db`
//! - **Dual-Location Config** - user-level and project-level configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use flowpoint::{BeginCheckpoint, CheckpointManager, Database, UndoOperation};
//! use serde_json::json;
//!
//! # async fn example() -> flowpoint::Result<()> {
//! let db = Database::initialize("/tmp/flowpoint.db").await?;
//! let manager = CheckpointManager::new(db);
//!
//! let checkpoint_id = manager
//!     .begin_checkpoint(42, BeginCheckpoint::new().description("Add field"))
//!     .await?;
//!
//! // ... INSERT INTO Fields ... returning id 7 ...
//! let key = json!({"id": 7}).as_object().cloned().unwrap_or_default();
//! manager
//!     .log_operation(&checkpoint_id, 42, UndoOperation::Insert, "Fields", key, None)
//!     .await?;
//!
//! manager.rollback_checkpoint(&checkpoint_id).await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod compensation;
pub mod config;
pub mod db;
pub mod logging;
pub mod manager;
pub mod models;
pub mod repositories;
pub mod session;
pub mod shutdown;
pub mod tools;
pub mod version;

mod error;
mod sql;

pub use error::{FlowpointError, Result};

pub use config::{load_config, ConfigLoader, FlowpointConfig};
pub use db::Database;
pub use manager::{BeginCheckpoint, CheckpointManager, RestoreSummary, RollbackSummary};
pub use models::{Checkpoint, CheckpointSource, CheckpointStatus, RowMap, UndoLogEntry, UndoOperation};
pub use repositories::{CheckpointRepository, UndoLogRepository};
pub use session::{CheckpointSession, OpenCheckpoint};
pub use shutdown::ShutdownCoordinator;
pub use tools::{
    BatchOutcome, BatchRequest, BatchResolution, CallStatus, MutatingTool, ToolBatchRunner,
    ToolCall, ToolCallResult, ToolContext, TrackedMutations,
};
pub use version::{full_version as version_info, short_version};
