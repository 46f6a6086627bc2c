//! Integration tests for ToolBatchRunner

mod common;

use async_trait::async_trait;
use common::*;
use flowpoint::config::ExecutionConfig;
use flowpoint::{
    BatchRequest, BatchResolution, CallStatus, CheckpointStatus, FlowpointError, MutatingTool,
    Result, ShutdownCoordinator, ToolBatchRunner, ToolCall, ToolContext,
};
use serde_json::{json, Value};
use std::sync::Arc;

/// Adds a field: {"caseid", "name", "label"}
struct AddField;

#[async_trait]
impl MutatingTool for AddField {
    fn name(&self) -> &str {
        "add_field"
    }

    async fn execute(&self, ctx: &ToolContext, arguments: Value) -> Result<Value> {
        let values = arguments
            .as_object()
            .cloned()
            .ok_or_else(|| FlowpointError::tool("add_field", "arguments must be an object"))?;
        let key = ctx.tracked().insert_row("fields", values, "id").await?;
        Ok(Value::Object(key))
    }
}

/// Relabels a field: {"id", "label"}
struct RelabelField;

#[async_trait]
impl MutatingTool for RelabelField {
    fn name(&self) -> &str {
        "relabel_field"
    }

    async fn execute(&self, ctx: &ToolContext, arguments: Value) -> Result<Value> {
        let id = arguments["id"].as_i64().unwrap_or_default();
        let changes = row(json!({"label": arguments["label"]}));
        let found = ctx.tracked().update_row("fields", key(id), changes).await?;
        if !found {
            return Err(FlowpointError::tool("relabel_field", format!("field {id} not found")));
        }
        Ok(json!({"updated": id}))
    }
}

struct Explode;

#[async_trait]
impl MutatingTool for Explode {
    fn name(&self) -> &str {
        "explode"
    }

    async fn execute(&self, _ctx: &ToolContext, _arguments: Value) -> Result<Value> {
        Err(FlowpointError::tool("explode", "boom"))
    }
}

/// Requests shutdown while running, like a user pressing "stop"
struct StopButton(ShutdownCoordinator);

#[async_trait]
impl MutatingTool for StopButton {
    fn name(&self) -> &str {
        "stop"
    }

    async fn execute(&self, _ctx: &ToolContext, _arguments: Value) -> Result<Value> {
        self.0.request_shutdown();
        Ok(Value::Null)
    }
}

fn runner(env: &TestEnv) -> ToolBatchRunner {
    ToolBatchRunner::new(Arc::clone(&env.manager))
        .with_tool(Arc::new(AddField))
        .with_tool(Arc::new(RelabelField))
        .with_tool(Arc::new(Explode))
}

fn add(env: &TestEnv, call_id: &str, name: &str) -> ToolCall {
    ToolCall::new(
        call_id,
        "add_field",
        json!({"caseid": env.case_id, "name": name, "label": name.to_uppercase()}),
    )
}

#[tokio::test]
async fn test_successful_batch_commits() {
    let env = setup().await;
    let existing = insert_field(&env.db, env.case_id, "title", "Title").await;

    let request = BatchRequest::new(vec![
        add(&env, "c1", "status"),
        ToolCall::new("c2", "relabel_field", json!({"id": existing, "label": "Heading"})),
    ])
    .for_case(env.case_id)
    .description("Add status, relabel title")
    .user_command("add a status field and rename title");

    let outcome = runner(&env)
        .run_batch(request, &ShutdownCoordinator::new())
        .await
        .unwrap();

    assert_eq!(outcome.resolution, BatchResolution::Committed);
    assert!(outcome.succeeded());
    assert_eq!(field_count(&env.db).await, 2);
    assert_eq!(label_of(&env.db, existing).await.as_deref(), Some("Heading"));

    let checkpoint_id = outcome.checkpoint_id.unwrap();
    let checkpoint = env.manager.get_checkpoint(&checkpoint_id).await.unwrap().unwrap();
    assert_eq!(checkpoint.status, CheckpointStatus::Historical);
    assert_eq!(checkpoint.changes_count, 2);
    assert_eq!(checkpoint.tools_executed, vec!["add_field", "relabel_field"]);
    assert_eq!(
        checkpoint.user_command.as_deref(),
        Some("add a status field and rename title")
    );
}

#[tokio::test]
async fn test_failed_call_rolls_back_batch() {
    let env = setup().await;

    let request = BatchRequest::new(vec![
        add(&env, "c1", "status"),
        ToolCall::new("c2", "explode", json!({})),
        add(&env, "c3", "owner"),
    ])
    .for_case(env.case_id);

    let outcome = runner(&env)
        .run_batch(request, &ShutdownCoordinator::new())
        .await
        .unwrap();

    assert_eq!(outcome.resolution, BatchResolution::RolledBack);
    assert!(!outcome.succeeded());
    assert!(matches!(outcome.results[0].status, CallStatus::Succeeded(_)));
    assert!(matches!(outcome.results[1].status, CallStatus::Failed(ref msg) if msg.contains("boom")));
    assert_eq!(outcome.results[2].status, CallStatus::Skipped);

    assert_eq!(field_count(&env.db).await, 0);
    let checkpoint = env
        .manager
        .get_checkpoint(outcome.checkpoint_id.as_deref().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(checkpoint.status, CheckpointStatus::RolledBack);
}

#[tokio::test]
async fn test_unknown_tool_is_a_failed_call() {
    let env = setup().await;

    let request = BatchRequest::new(vec![
        add(&env, "c1", "status"),
        ToolCall::new("c2", "no_such_tool", json!({})),
    ])
    .for_case(env.case_id);

    let outcome = runner(&env)
        .run_batch(request, &ShutdownCoordinator::new())
        .await
        .unwrap();

    assert_eq!(outcome.resolution, BatchResolution::RolledBack);
    assert!(matches!(outcome.results[1].status, CallStatus::Failed(ref msg) if msg.contains("no_such_tool")));
    assert_eq!(field_count(&env.db).await, 0);
}

#[tokio::test]
async fn test_cancellation_rolls_back_and_skips_remaining_calls() {
    let env = setup().await;
    let shutdown = ShutdownCoordinator::new();
    let runner = runner(&env).with_tool(Arc::new(StopButton(shutdown.clone())));

    let request = BatchRequest::new(vec![
        add(&env, "c1", "status"),
        ToolCall::new("c2", "stop", json!({})),
        add(&env, "c3", "owner"),
    ])
    .for_case(env.case_id);

    let outcome = runner.run_batch(request, &shutdown).await.unwrap();

    assert_eq!(outcome.resolution, BatchResolution::Cancelled);
    assert_eq!(outcome.results[2].status, CallStatus::Skipped);
    assert_eq!(field_count(&env.db).await, 0);

    let checkpoint = env
        .manager
        .get_checkpoint(outcome.checkpoint_id.as_deref().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(checkpoint.status, CheckpointStatus::RolledBack);
}

#[tokio::test]
async fn test_batch_without_case_runs_unchecked() {
    let env = setup().await;

    let request = BatchRequest::new(vec![
        add(&env, "c1", "status"),
        ToolCall::new("c2", "explode", json!({})),
    ]);

    let outcome = runner(&env)
        .run_batch(request, &ShutdownCoordinator::new())
        .await
        .unwrap();

    assert_eq!(outcome.resolution, BatchResolution::Unchecked);
    assert!(outcome.checkpoint_id.is_none());

    // Nothing to roll back to: the insert stays
    assert_eq!(field_count(&env.db).await, 1);
    assert!(env.manager.get_active_checkpoints(None).await.unwrap().is_empty());
    assert!(env.manager.get_checkpoint_history(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrent_batch_attempts_every_call() {
    let env = setup().await;
    let runner = ToolBatchRunner::with_config(
        Arc::clone(&env.manager),
        &ExecutionConfig {
            concurrent_tools: true,
        },
    )
    .with_tool(Arc::new(AddField))
    .with_tool(Arc::new(Explode));

    let request = BatchRequest::new(vec![
        add(&env, "c1", "status"),
        add(&env, "c2", "owner"),
        ToolCall::new("c3", "explode", json!({})),
        add(&env, "c4", "priority"),
    ])
    .for_case(env.case_id);

    let outcome = runner
        .run_batch(request, &ShutdownCoordinator::new())
        .await
        .unwrap();

    assert_eq!(outcome.resolution, BatchResolution::RolledBack);
    let succeeded = outcome
        .results
        .iter()
        .filter(|r| matches!(r.status, CallStatus::Succeeded(_)))
        .count();
    assert_eq!(succeeded, 3);
    assert_eq!(field_count(&env.db).await, 0);
}

#[tokio::test]
async fn test_shutdown_before_dispatch_skips_everything() {
    let env = setup().await;
    let shutdown = ShutdownCoordinator::new();
    shutdown.request_shutdown();

    for concurrent in [false, true] {
        let request = BatchRequest::new(vec![add(&env, "c1", "status")]).for_case(env.case_id);
        let outcome = runner(&env)
            .concurrent(concurrent)
            .run_batch(request, &shutdown)
            .await
            .unwrap();

        assert_eq!(outcome.resolution, BatchResolution::Cancelled);
        assert_eq!(outcome.results[0].status, CallStatus::Skipped);
    }
    assert_eq!(field_count(&env.db).await, 0);
}

#[tokio::test]
async fn test_tool_names_are_sorted() {
    let env = setup().await;
    assert_eq!(
        runner(&env).tool_names(),
        vec!["add_field", "explode", "relabel_field"]
    );
}
