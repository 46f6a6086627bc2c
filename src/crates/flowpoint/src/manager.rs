//! Checkpoint manager
//!
//! Orchestrates logical transactions spanning many independent statements:
//! begin a checkpoint, log the pre-image of every mutation made under it,
//! then either commit (keep the changes and the undo trail) or roll back
//! (replay the trail in reverse inside one database transaction).
//!
//! State machine for a single checkpoint:
//!
//! ```text
//! active --commit_checkpoint-->   historical
//! active --rollback_checkpoint--> rolled_back
//! historical --restore_to_checkpoint--> rolled_back
//! ```

use crate::compensation::apply_entries;
use crate::config::CheckpointConfig;
use crate::db::Database;
use crate::error::{FlowpointError, Result};
use crate::models::{
    now_timestamp, Checkpoint, CheckpointSource, CheckpointStatus, RowMap, UndoLogEntry,
    UndoOperation,
};
use crate::repositories::{CheckpointRepository, NewUndoEntry, UndoLogRepository};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Provenance metadata for a new checkpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BeginCheckpoint {
    pub description: Option<String>,
    pub user_command: Option<String>,
    pub source: CheckpointSource,
}

impl BeginCheckpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn user_command(mut self, command: impl Into<String>) -> Self {
        self.user_command = Some(command.into());
        self
    }

    pub fn source(mut self, source: CheckpointSource) -> Self {
        self.source = source;
        self
    }
}

/// Result of rolling back one checkpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackSummary {
    pub checkpoint_id: String,
    pub entries_applied: usize,
}

/// Result of restoring history to a checkpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreSummary {
    pub target_id: String,

    /// Checkpoints undone, newest first
    pub rolled_back: Vec<String>,

    pub entries_applied: usize,
}

/// Checkpoint manager
///
/// Construct once at startup and share (it is cheap to clone) with every
/// consumer that begins, logs, or resolves checkpoints.
#[derive(Clone, Debug)]
pub struct CheckpointManager {
    db: Database,
    history_limit: u32,
}

impl CheckpointManager {
    /// Create a manager with the default history limit
    pub fn new(db: Database) -> Self {
        Self::with_config(db, &CheckpointConfig::default())
    }

    /// Create a manager from configuration
    pub fn with_config(db: Database, config: &CheckpointConfig) -> Self {
        Self {
            db,
            history_limit: config.history_limit,
        }
    }

    /// Get the underlying database
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Maximum number of checkpoints returned by [`Self::get_checkpoint_history`]
    pub fn history_limit(&self) -> u32 {
        self.history_limit
    }

    /// Open a new active checkpoint for `case_id` and return its id
    #[instrument(level = "debug", skip(self, options))]
    pub async fn begin_checkpoint(&self, case_id: i64, options: BeginCheckpoint) -> Result<String> {
        let checkpoint = Checkpoint {
            id: Uuid::new_v4().to_string(),
            case_id,
            description: options.description,
            user_command: options.user_command,
            status: CheckpointStatus::Active,
            source: options.source,
            created_at: now_timestamp(),
            finished_at: None,
            tools_executed: Vec::new(),
            changes_count: 0,
        };

        let tools_json = serde_json::to_string(&checkpoint.tools_executed)?;
        CheckpointRepository::create(self.db.pool(), &checkpoint, &tools_json).await?;

        info!(checkpoint_id = %checkpoint.id, case_id, source = %checkpoint.source, "Checkpoint started");
        Ok(checkpoint.id)
    }

    /// Record the pre-image of a mutation that has just been executed
    ///
    /// `previous_data` is the row as it was before the mutation and must be
    /// present for updates and deletes; inserts only need the key. Logging
    /// into a checkpoint that is not active, or under a case other than the
    /// checkpoint's own, is rejected.
    pub async fn log_operation(
        &self,
        checkpoint_id: &str,
        case_id: i64,
        operation: UndoOperation,
        table_name: &str,
        primary_key: RowMap,
        previous_data: Option<RowMap>,
    ) -> Result<UndoLogEntry> {
        if primary_key.is_empty() {
            return Err(FlowpointError::InvalidEntry(format!(
                "{} on {} logged without a primary key",
                operation, table_name
            )));
        }
        if operation.requires_pre_image() && previous_data.is_none() {
            return Err(FlowpointError::MissingPreImage {
                entry_id: "(unlogged)".to_string(),
                operation: operation.to_string(),
            });
        }

        let id = Uuid::new_v4().to_string();
        let created_at = now_timestamp();
        let primary_key_json = serde_json::to_string(&primary_key)?;
        let previous_data_json = previous_data.as_ref().map(serde_json::to_string).transpose()?;
        let new_entry = NewUndoEntry {
            id: &id,
            checkpoint_id,
            case_id,
            operation,
            table_name,
            primary_key: &primary_key_json,
            previous_data: previous_data_json.as_deref(),
            created_at: &created_at,
        };

        match UndoLogRepository::append(self.db.pool(), new_entry).await? {
            Some(entry) => {
                debug!(
                    checkpoint_id,
                    sequence = entry.sequence,
                    operation = %operation,
                    table = table_name,
                    "Logged undo entry"
                );
                Ok(entry)
            }
            None => Err(self.log_rejection(checkpoint_id, case_id).await),
        }
    }

    /// Accept a checkpoint's changes, keeping its undo trail as history
    #[instrument(level = "debug", skip(self))]
    pub async fn commit_checkpoint(&self, checkpoint_id: &str) -> Result<Checkpoint> {
        let finished_at = now_timestamp();

        match CheckpointRepository::mark_historical(self.db.pool(), checkpoint_id, &finished_at).await? {
            Some(checkpoint) => {
                info!(
                    checkpoint_id,
                    changes = checkpoint.changes_count,
                    "Checkpoint committed"
                );
                Ok(checkpoint)
            }
            None => Err(self.transition_error(checkpoint_id, "commit").await),
        }
    }

    /// Undo every logged change of an active checkpoint
    ///
    /// Runs in one database transaction: on any failure nothing is undone and
    /// the checkpoint stays active.
    #[instrument(level = "debug", skip(self))]
    pub async fn rollback_checkpoint(&self, checkpoint_id: &str) -> Result<RollbackSummary> {
        let mut tx = self.db.pool().begin().await?;
        let finished_at = now_timestamp();

        // Status first: takes the write lock and rejects a second rollback
        let updated = CheckpointRepository::mark_rolled_back(
            &mut *tx,
            checkpoint_id,
            CheckpointStatus::Active,
            &finished_at,
        )
        .await?;

        if !updated {
            let err = match CheckpointRepository::get_by_id(&mut *tx, checkpoint_id).await? {
                Some(checkpoint) => invalid_transition(&checkpoint, "roll back"),
                None => FlowpointError::checkpoint_not_found(checkpoint_id),
            };
            return Err(err);
        }

        let entries_applied = undo_checkpoint(&mut *tx, checkpoint_id).await?;
        tx.commit().await?;

        info!(checkpoint_id, entries_applied, "Checkpoint rolled back");
        Ok(RollbackSummary {
            checkpoint_id: checkpoint_id.to_string(),
            entries_applied,
        })
    }

    /// Undo the target checkpoint and every accepted checkpoint after it
    ///
    /// Eligible checkpoints (historical or committed, created at or after the
    /// target) are undone newest first inside one transaction.
    #[instrument(level = "debug", skip(self))]
    pub async fn restore_to_checkpoint(&self, checkpoint_id: &str) -> Result<RestoreSummary> {
        let target = CheckpointRepository::get_by_id(self.db.pool(), checkpoint_id)
            .await?
            .ok_or_else(|| FlowpointError::checkpoint_not_found(checkpoint_id))?;

        let mut tx = self.db.pool().begin().await?;
        let finished_at = now_timestamp();

        // Status first so the transaction holds the write lock before replay
        let mut candidates =
            CheckpointRepository::mark_restorable_since_rolled_back(&mut *tx, &target, &finished_at)
                .await?;
        candidates.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.insertion_order.cmp(&a.insertion_order))
        });

        let mut entries_applied = 0;
        let mut rolled_back = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let applied = undo_checkpoint(&mut *tx, &candidate.id).await?;
            debug!(checkpoint_id = %candidate.id, applied, "Restored past checkpoint");
            entries_applied += applied;
            rolled_back.push(candidate.id);
        }

        tx.commit().await?;

        info!(
            target = checkpoint_id,
            checkpoints = rolled_back.len(),
            entries_applied,
            "Restored to checkpoint"
        );
        Ok(RestoreSummary {
            target_id: target.id,
            rolled_back,
            entries_applied,
        })
    }

    /// Get a checkpoint by id
    pub async fn get_checkpoint(&self, checkpoint_id: &str) -> Result<Option<Checkpoint>> {
        Ok(CheckpointRepository::get_by_id(self.db.pool(), checkpoint_id).await?)
    }

    /// Undo-log entries of a checkpoint in logged order
    pub async fn get_undo_entries(&self, checkpoint_id: &str) -> Result<Vec<UndoLogEntry>> {
        Ok(UndoLogRepository::list_by_checkpoint(self.db.pool(), checkpoint_id).await?)
    }

    /// Active checkpoints, newest first
    pub async fn get_active_checkpoints(&self, case_id: Option<i64>) -> Result<Vec<Checkpoint>> {
        Ok(CheckpointRepository::list_active(self.db.pool(), case_id).await?)
    }

    /// Finished checkpoints, newest first, capped at the history limit
    pub async fn get_checkpoint_history(&self, case_id: Option<i64>) -> Result<Vec<Checkpoint>> {
        Ok(CheckpointRepository::list_history(self.db.pool(), case_id, self.history_limit).await?)
    }

    /// Discard a checkpoint and its undo trail without undoing anything
    ///
    /// Returns whether the checkpoint existed.
    #[instrument(level = "debug", skip(self))]
    pub async fn delete_checkpoint(&self, checkpoint_id: &str) -> Result<bool> {
        let mut tx = self.db.pool().begin().await?;

        let entries = UndoLogRepository::delete_by_checkpoint(&mut *tx, checkpoint_id).await?;
        let deleted = CheckpointRepository::delete(&mut *tx, checkpoint_id).await?;

        tx.commit().await?;

        info!(checkpoint_id, entries, existed = deleted > 0, "Checkpoint deleted");
        Ok(deleted > 0)
    }

    /// Discard all checkpoints (optionally of one case) and their undo trails
    ///
    /// Returns the number of checkpoints removed.
    #[instrument(level = "debug", skip(self))]
    pub async fn delete_all_checkpoints(&self, case_id: Option<i64>) -> Result<u64> {
        let mut tx = self.db.pool().begin().await?;

        let entries = UndoLogRepository::delete_all(&mut *tx, case_id).await?;
        let deleted = CheckpointRepository::delete_all(&mut *tx, case_id).await?;

        tx.commit().await?;

        info!(?case_id, checkpoints = deleted, entries, "Checkpoints deleted");
        Ok(deleted)
    }

    /// Note that `tool_name` ran under the checkpoint
    ///
    /// Observability only: failures are logged and otherwise ignored.
    pub async fn record_tool_execution(&self, checkpoint_id: &str, tool_name: &str) {
        match CheckpointRepository::append_tool(self.db.pool(), checkpoint_id, tool_name).await {
            Ok(true) => debug!(checkpoint_id, tool = tool_name, "Recorded tool execution"),
            Ok(false) => warn!(checkpoint_id, tool = tool_name, "Tool recorded against unknown checkpoint"),
            Err(e) => warn!(checkpoint_id, tool = tool_name, error = %e, "Failed to record tool execution"),
        }
    }

    /// Explain why an append matched no active checkpoint of `case_id`
    async fn log_rejection(&self, checkpoint_id: &str, case_id: i64) -> FlowpointError {
        match CheckpointRepository::get_by_id(self.db.pool(), checkpoint_id).await {
            Ok(Some(checkpoint)) if checkpoint.case_id != case_id => {
                FlowpointError::InvalidEntry(format!(
                    "checkpoint {} belongs to case {}, not case {}",
                    checkpoint_id, checkpoint.case_id, case_id
                ))
            }
            Ok(Some(checkpoint)) => invalid_transition(&checkpoint, "log into"),
            Ok(None) => FlowpointError::checkpoint_not_found(checkpoint_id),
            Err(e) => e.into(),
        }
    }

    /// Explain why a status-guarded statement matched no checkpoint
    async fn transition_error(&self, checkpoint_id: &str, action: &'static str) -> FlowpointError {
        match CheckpointRepository::get_by_id(self.db.pool(), checkpoint_id).await {
            Ok(Some(checkpoint)) => invalid_transition(&checkpoint, action),
            Ok(None) => FlowpointError::checkpoint_not_found(checkpoint_id),
            Err(e) => e.into(),
        }
    }
}

fn invalid_transition(checkpoint: &Checkpoint, action: &'static str) -> FlowpointError {
    FlowpointError::InvalidTransition {
        id: checkpoint.id.clone(),
        status: checkpoint.status.to_string(),
        action,
    }
}

/// Replay and discard one checkpoint's undo trail on an open transaction
async fn undo_checkpoint(conn: &mut SqliteConnection, checkpoint_id: &str) -> Result<usize> {
    let entries = UndoLogRepository::list_for_replay(&mut *conn, checkpoint_id).await?;
    let applied = apply_entries(&mut *conn, &entries).await?;
    UndoLogRepository::delete_by_checkpoint(&mut *conn, checkpoint_id).await?;
    Ok(applied)
}
