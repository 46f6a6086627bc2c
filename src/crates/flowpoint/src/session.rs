//! Single-slot checkpoint session
//!
//! A tool-execution context holds at most one open checkpoint. Tools log
//! through the session without knowing the checkpoint id, and the consumer
//! resolves it with [`CheckpointSession::commit_session`] or
//! [`CheckpointSession::rollback_session`]. Nested checkpoints are not
//! supported: beginning while one is open fails.

use crate::error::{FlowpointError, Result};
use crate::manager::{BeginCheckpoint, CheckpointManager, RollbackSummary};
use crate::models::{Checkpoint, RowMap, UndoOperation};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// The checkpoint currently open in a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenCheckpoint {
    pub checkpoint_id: String,
    pub case_id: i64,
}

#[derive(Debug)]
enum Slot {
    Idle,
    Opening,
    Open(OpenCheckpoint),
}

/// One tool-execution session's "current transaction"
#[derive(Debug)]
pub struct CheckpointSession {
    manager: Arc<CheckpointManager>,
    slot: Mutex<Slot>,
}

impl CheckpointSession {
    /// Create an idle session
    pub fn new(manager: Arc<CheckpointManager>) -> Self {
        Self {
            manager,
            slot: Mutex::new(Slot::Idle),
        }
    }

    /// Get the checkpoint manager
    pub fn manager(&self) -> &Arc<CheckpointManager> {
        &self.manager
    }

    /// The open checkpoint, if any
    pub fn current(&self) -> Option<OpenCheckpoint> {
        match &*self.slot.lock() {
            Slot::Open(open) => Some(open.clone()),
            _ => None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.current().is_some()
    }

    /// Begin a checkpoint for `case_id` and make it the session's current one
    pub async fn begin_session(&self, case_id: i64, options: BeginCheckpoint) -> Result<String> {
        {
            let mut slot = self.slot.lock();
            match &*slot {
                Slot::Idle => *slot = Slot::Opening,
                Slot::Opening => {
                    return Err(FlowpointError::SessionAlreadyOpen("(opening)".to_string()))
                }
                Slot::Open(open) => {
                    return Err(FlowpointError::SessionAlreadyOpen(open.checkpoint_id.clone()))
                }
            }
        }

        match self.manager.begin_checkpoint(case_id, options).await {
            Ok(checkpoint_id) => {
                *self.slot.lock() = Slot::Open(OpenCheckpoint {
                    checkpoint_id: checkpoint_id.clone(),
                    case_id,
                });
                Ok(checkpoint_id)
            }
            Err(e) => {
                *self.slot.lock() = Slot::Idle;
                Err(e)
            }
        }
    }

    /// Commit the open checkpoint and return the session to idle
    ///
    /// On failure the checkpoint stays open so the caller can roll it back.
    pub async fn commit_session(&self) -> Result<Checkpoint> {
        let open = self.current().ok_or(FlowpointError::NoOpenSession)?;
        let checkpoint = self.manager.commit_checkpoint(&open.checkpoint_id).await?;
        self.clear();
        Ok(checkpoint)
    }

    /// Roll back the open checkpoint and return the session to idle
    pub async fn rollback_session(&self) -> Result<RollbackSummary> {
        let open = self.current().ok_or(FlowpointError::NoOpenSession)?;
        let summary = self.manager.rollback_checkpoint(&open.checkpoint_id).await?;
        self.clear();
        Ok(summary)
    }

    /// Log a mutation against the open checkpoint
    ///
    /// Returns `false` without logging when no checkpoint is open; such a
    /// mutation is not reversible.
    pub async fn log_operation(
        &self,
        operation: UndoOperation,
        table_name: &str,
        primary_key: RowMap,
        previous_data: Option<RowMap>,
    ) -> Result<bool> {
        let Some(open) = self.current() else {
            debug!(table = table_name, operation = %operation, "No open checkpoint, mutation not logged");
            return Ok(false);
        };

        self.manager
            .log_operation(
                &open.checkpoint_id,
                open.case_id,
                operation,
                table_name,
                primary_key,
                previous_data,
            )
            .await?;
        Ok(true)
    }

    /// Record a tool name against the open checkpoint (best-effort)
    pub async fn record_tool(&self, tool_name: &str) {
        if let Some(open) = self.current() {
            self.manager
                .record_tool_execution(&open.checkpoint_id, tool_name)
                .await;
        }
    }

    fn clear(&self) {
        *self.slot.lock() = Slot::Idle;
    }
}
