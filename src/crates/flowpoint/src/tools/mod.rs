//! Tool-execution integration
//!
//! Mutating tools run against a [`ToolContext`] that carries the shared
//! database and the batch's [`CheckpointSession`]. Each tool is expected to
//! log the pre-image of every row it changes, either through
//! [`TrackedMutations`] or by calling [`CheckpointSession::log_operation`]
//! itself right after its own statement succeeds.

mod runner;
mod tracked;

pub use runner::{BatchOutcome, BatchRequest, BatchResolution, CallStatus, ToolBatchRunner, ToolCallResult};
pub use tracked::TrackedMutations;

use crate::db::Database;
use crate::error::Result;
use crate::session::CheckpointSession;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// A tool that may mutate business tables
#[async_trait]
pub trait MutatingTool: Send + Sync {
    /// Name the LLM uses to call this tool
    fn name(&self) -> &str;

    /// Execute the tool with JSON arguments
    async fn execute(&self, ctx: &ToolContext, arguments: Value) -> Result<Value>;
}

/// One requested tool invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Caller-assigned id (e.g. the LLM's tool_call id)
    pub id: String,
    pub tool: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, tool: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            tool: tool.into(),
            arguments,
        }
    }
}

/// Resources available to a tool during one batch
#[derive(Debug, Clone)]
pub struct ToolContext {
    database: Database,
    session: Arc<CheckpointSession>,
}

impl ToolContext {
    pub fn new(database: Database, session: Arc<CheckpointSession>) -> Self {
        Self { database, session }
    }

    /// Get the shared database
    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Get the batch's checkpoint session
    pub fn session(&self) -> &Arc<CheckpointSession> {
        &self.session
    }

    /// Row mutations that log their own pre-images
    pub fn tracked(&self) -> TrackedMutations<'_> {
        TrackedMutations::new(self)
    }
}
