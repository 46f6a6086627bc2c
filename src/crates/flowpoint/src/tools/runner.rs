//! Batch tool execution under one checkpoint
//!
//! A batch is the set of tool calls produced by one LLM turn. With a case id
//! the batch opens a checkpoint, runs its calls, and then commits when every
//! call succeeded or rolls back when any call failed or the batch was
//! cancelled. Without a case id the calls run unchecked.

use super::{MutatingTool, ToolCall, ToolContext};
use crate::config::ExecutionConfig;
use crate::error::Result;
use crate::manager::{BeginCheckpoint, CheckpointManager};
use crate::models::CheckpointSource;
use crate::session::CheckpointSession;
use crate::shutdown::ShutdownCoordinator;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Tool calls to run as one logical transaction
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchRequest {
    /// Case the mutations belong to; `None` disables checkpointing
    pub case_id: Option<i64>,
    pub description: Option<String>,
    pub user_command: Option<String>,
    #[serde(default)]
    pub source: CheckpointSource,
    pub calls: Vec<ToolCall>,
}

impl BatchRequest {
    pub fn new(calls: Vec<ToolCall>) -> Self {
        Self {
            calls,
            ..Self::default()
        }
    }

    pub fn for_case(mut self, case_id: i64) -> Self {
        self.case_id = Some(case_id);
        self
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

    fn checkpoint_options(&self) -> BeginCheckpoint {
        BeginCheckpoint {
            description: self.description.clone(),
            user_command: self.user_command.clone(),
            source: self.source,
        }
    }
}

/// What happened to one call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum CallStatus {
    Succeeded(Value),
    Failed(String),
    /// Not attempted (an earlier call failed or the batch was cancelled)
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub call_id: String,
    pub tool: String,
    pub status: CallStatus,
}

/// How the batch's checkpoint was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchResolution {
    Committed,
    RolledBack,
    Cancelled,
    /// No case id, so nothing was checkpointed
    Unchecked,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub checkpoint_id: Option<String>,
    pub resolution: BatchResolution,
    pub results: Vec<ToolCallResult>,
}

impl BatchOutcome {
    /// Whether every call succeeded
    pub fn succeeded(&self) -> bool {
        self.results
            .iter()
            .all(|r| matches!(r.status, CallStatus::Succeeded(_)))
    }
}

/// Runs batches of mutating tool calls
pub struct ToolBatchRunner {
    manager: Arc<CheckpointManager>,
    tools: HashMap<String, Arc<dyn MutatingTool>>,
    concurrent: bool,
}

impl std::fmt::Debug for ToolBatchRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.tools.keys().collect();
        names.sort();
        f.debug_struct("ToolBatchRunner")
            .field("tools", &names)
            .field("concurrent", &self.concurrent)
            .finish()
    }
}

impl ToolBatchRunner {
    /// Create a runner that dispatches calls in order
    pub fn new(manager: Arc<CheckpointManager>) -> Self {
        Self {
            manager,
            tools: HashMap::new(),
            concurrent: false,
        }
    }

    /// Create a runner from execution configuration
    pub fn with_config(manager: Arc<CheckpointManager>, config: &ExecutionConfig) -> Self {
        Self::new(manager).concurrent(config.concurrent_tools)
    }

    /// Dispatch a batch's calls concurrently instead of in order
    pub fn concurrent(mut self, concurrent: bool) -> Self {
        self.concurrent = concurrent;
        self
    }

    /// Register a tool, replacing any tool with the same name
    pub fn register(&mut self, tool: Arc<dyn MutatingTool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn with_tool(mut self, tool: Arc<dyn MutatingTool>) -> Self {
        self.register(tool);
        self
    }

    /// Registered tool names, sorted
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Run a batch and resolve its checkpoint
    ///
    /// Tool failures are reported in the outcome, not as `Err`. An `Err` means
    /// the checkpoint could not be opened or resolved; a checkpoint that failed
    /// to roll back is left active.
    #[instrument(skip_all, fields(case_id = ?request.case_id, calls = request.calls.len()))]
    pub async fn run_batch(
        &self,
        request: BatchRequest,
        shutdown: &ShutdownCoordinator,
    ) -> Result<BatchOutcome> {
        let session = Arc::new(CheckpointSession::new(Arc::clone(&self.manager)));

        let checkpoint_id = match request.case_id {
            Some(case_id) => Some(
                session
                    .begin_session(case_id, request.checkpoint_options())
                    .await?,
            ),
            None => {
                debug!("No case id, running batch without a checkpoint");
                None
            }
        };

        let ctx = ToolContext::new(self.manager.database().clone(), Arc::clone(&session));
        let results = if self.concurrent {
            self.run_concurrent(&ctx, &request.calls, shutdown).await
        } else {
            self.run_sequential(&ctx, &request.calls, shutdown).await
        };

        let Some(checkpoint_id) = checkpoint_id else {
            return Ok(BatchOutcome {
                checkpoint_id: None,
                resolution: BatchResolution::Unchecked,
                results,
            });
        };

        let cancelled = shutdown.is_shutdown_requested();
        let failed = results
            .iter()
            .any(|r| matches!(r.status, CallStatus::Failed(_)));

        let resolution = if cancelled || failed {
            let summary = session.rollback_session().await?;
            info!(
                checkpoint_id = %summary.checkpoint_id,
                entries_applied = summary.entries_applied,
                cancelled,
                "Batch rolled back"
            );
            if cancelled {
                BatchResolution::Cancelled
            } else {
                BatchResolution::RolledBack
            }
        } else {
            match session.commit_session().await {
                Ok(checkpoint) => {
                    info!(checkpoint_id = %checkpoint.id, changes = checkpoint.changes_count, "Batch committed");
                    BatchResolution::Committed
                }
                Err(commit_err) => {
                    error!(checkpoint_id = %checkpoint_id, error = %commit_err, "Commit failed, rolling back");
                    if let Err(rollback_err) = session.rollback_session().await {
                        error!(checkpoint_id = %checkpoint_id, error = %rollback_err, "Rollback after failed commit failed");
                    }
                    return Err(commit_err);
                }
            }
        };

        Ok(BatchOutcome {
            checkpoint_id: Some(checkpoint_id),
            resolution,
            results,
        })
    }

    /// Run calls in order, stopping at the first failure or on shutdown
    async fn run_sequential(
        &self,
        ctx: &ToolContext,
        calls: &[ToolCall],
        shutdown: &ShutdownCoordinator,
    ) -> Vec<ToolCallResult> {
        let mut results = Vec::with_capacity(calls.len());
        let mut halted = false;

        for call in calls {
            if !halted && shutdown.is_shutdown_requested() {
                warn!(call_id = %call.id, "Shutdown requested, skipping remaining calls");
                halted = true;
            }

            if halted {
                results.push(skipped(call));
                continue;
            }

            let result = self.dispatch(ctx, call).await;
            halted = matches!(result.status, CallStatus::Failed(_));
            results.push(result);
        }

        results
    }

    /// Run all calls at once; every call is attempted unless shutdown was
    /// already requested
    async fn run_concurrent(
        &self,
        ctx: &ToolContext,
        calls: &[ToolCall],
        shutdown: &ShutdownCoordinator,
    ) -> Vec<ToolCallResult> {
        if shutdown.is_shutdown_requested() {
            warn!("Shutdown requested before dispatch, skipping all calls");
            return calls.iter().map(skipped).collect();
        }

        let dispatches = calls.iter().map(|call| self.dispatch(ctx, call));
        futures::future::join_all(dispatches).await
    }

    async fn dispatch(&self, ctx: &ToolContext, call: &ToolCall) -> ToolCallResult {
        let Some(tool) = self.tools.get(&call.tool) else {
            warn!(call_id = %call.id, tool = %call.tool, "Unknown tool");
            return ToolCallResult {
                call_id: call.id.clone(),
                tool: call.tool.clone(),
                status: CallStatus::Failed(format!("Tool '{}' not found", call.tool)),
            };
        };

        debug!(call_id = %call.id, tool = %call.tool, "Executing tool");
        let status = match tool.execute(ctx, call.arguments.clone()).await {
            Ok(value) => CallStatus::Succeeded(value),
            Err(e) => {
                warn!(call_id = %call.id, tool = %call.tool, error = %e, "Tool failed");
                CallStatus::Failed(e.to_string())
            }
        };

        ctx.session().record_tool(&call.tool).await;

        ToolCallResult {
            call_id: call.id.clone(),
            tool: call.tool.clone(),
            status,
        }
    }
}

fn skipped(call: &ToolCall) -> ToolCallResult {
    ToolCallResult {
        call_id: call.id.clone(),
        tool: call.tool.clone(),
        status: CallStatus::Skipped,
    }
}
