//! Checkpoint administration command handlers

use crate::error::{FlowpointError, Result};
use crate::manager::CheckpointManager;
use crate::models::{Checkpoint, CheckpointStatus, UndoLogEntry};
use chrono::{DateTime, Local};
use colored::{ColoredString, Colorize};
use serde_json::Value;
use tabled::{Table, Tabled};

/// Checkpoint display row for table output
#[derive(Tabled)]
struct CheckpointRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Case")]
    case_id: i64,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Description")]
    description: String,
    #[tabled(rename = "Tools")]
    tools: usize,
    #[tabled(rename = "Changes")]
    changes: i64,
    #[tabled(rename = "Created")]
    created: String,
}

impl From<Checkpoint> for CheckpointRow {
    fn from(checkpoint: Checkpoint) -> Self {
        Self {
            description: truncate(checkpoint.description.as_deref().unwrap_or("-"), 40),
            created: format_timestamp(&checkpoint.created_at),
            id: checkpoint.id,
            case_id: checkpoint.case_id,
            status: checkpoint.status.to_string(),
            source: checkpoint.source.to_string(),
            tools: checkpoint.tools_executed.len(),
            changes: checkpoint.changes_count,
        }
    }
}

/// Undo-log entry display row
#[derive(Tabled)]
struct EntryRow {
    #[tabled(rename = "Seq")]
    sequence: i64,
    #[tabled(rename = "Operation")]
    operation: String,
    #[tabled(rename = "Table")]
    table: String,
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Pre-image")]
    pre_image: String,
    #[tabled(rename = "Logged")]
    logged: String,
}

impl From<UndoLogEntry> for EntryRow {
    fn from(entry: UndoLogEntry) -> Self {
        Self {
            sequence: entry.sequence,
            operation: entry.operation.to_string(),
            table: entry.table_name,
            key: Value::Object(entry.primary_key).to_string(),
            pre_image: entry
                .previous_data
                .map(|data| truncate(&Value::Object(data).to_string(), 50))
                .unwrap_or_else(|| "-".to_string()),
            logged: format_timestamp(&entry.created_at),
        }
    }
}

/// Render a stored RFC 3339 timestamp in local time
fn format_timestamp(timestamp: &str) -> String {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|dt| dt.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|_| timestamp.to_string())
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let kept: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        text.to_string()
    }
}

fn colorize_status(status: CheckpointStatus) -> ColoredString {
    match status {
        CheckpointStatus::Active => status.as_str().yellow(),
        CheckpointStatus::Committed | CheckpointStatus::Historical => status.as_str().green(),
        CheckpointStatus::RolledBack => status.as_str().red(),
    }
}

fn print_checkpoints(checkpoints: Vec<Checkpoint>, label: &str) {
    let count = checkpoints.len();
    let rows: Vec<CheckpointRow> = checkpoints.into_iter().map(CheckpointRow::from).collect();

    println!("{}", Table::new(rows));
    println!("\nTotal: {} {}", count, label);
}

/// Handle `active` command
pub async fn handle_active(manager: &CheckpointManager, case_id: Option<i64>) -> Result<()> {
    let checkpoints = manager.get_active_checkpoints(case_id).await?;

    if checkpoints.is_empty() {
        println!("{}", "No active checkpoints".yellow());
        return Ok(());
    }

    print_checkpoints(checkpoints, "active checkpoints");
    Ok(())
}

/// Handle `history` command
pub async fn handle_history(manager: &CheckpointManager, case_id: Option<i64>) -> Result<()> {
    let checkpoints = manager.get_checkpoint_history(case_id).await?;

    if checkpoints.is_empty() {
        println!("{}", "No checkpoint history".yellow());
        return Ok(());
    }

    print_checkpoints(checkpoints, "finished checkpoints");
    Ok(())
}

/// Handle `show` command
pub async fn handle_show(manager: &CheckpointManager, id: String) -> Result<()> {
    let checkpoint = manager
        .get_checkpoint(&id)
        .await?
        .ok_or_else(|| FlowpointError::checkpoint_not_found(&id))?;
    let entries = manager.get_undo_entries(&id).await?;

    println!("\n{}", "Checkpoint Details".bold().underline());
    println!("\n{}: {}", "ID".bold(), checkpoint.id);
    println!("{}: {}", "Case".bold(), checkpoint.case_id);
    println!("{}: {}", "Status".bold(), colorize_status(checkpoint.status));
    println!("{}: {}", "Source".bold(), checkpoint.source);

    if let Some(description) = &checkpoint.description {
        println!("{}: {}", "Description".bold(), description);
    }
    if let Some(command) = &checkpoint.user_command {
        println!("{}: {}", "User command".bold(), command);
    }

    println!("\n{}: {}", "Created".bold(), format_timestamp(&checkpoint.created_at));
    println!(
        "{}: {}",
        "Finished".bold(),
        checkpoint
            .finished_at
            .as_deref()
            .map(format_timestamp)
            .unwrap_or_else(|| "Not finished".to_string())
    );
    println!("{}: {}", "Changes".bold(), checkpoint.changes_count);

    if checkpoint.is_active() {
        println!(
            "\n{}",
            format!("Unresolved. Undo with 'flowpoint rollback {}'.", checkpoint.id).yellow()
        );
    }

    if !checkpoint.tools_executed.is_empty() {
        println!("\n{}:", "Tools executed".bold());
        for tool in &checkpoint.tools_executed {
            println!("  • {}", tool);
        }
    }

    if entries.is_empty() {
        println!("\n{}", "No undo entries".dimmed());
    } else {
        println!("\n{} ({}):", "Undo log".bold(), entries.len());
        let rows: Vec<EntryRow> = entries.into_iter().map(EntryRow::from).collect();
        println!("{}", Table::new(rows));
    }

    Ok(())
}

/// Handle `rollback` command
pub async fn handle_rollback(manager: &CheckpointManager, id: String) -> Result<()> {
    let summary = manager.rollback_checkpoint(&id).await?;

    println!("{}", "✓ Checkpoint rolled back".green().bold());
    println!("  ID: {}", summary.checkpoint_id);
    println!("  Changes undone: {}", summary.entries_applied);

    Ok(())
}

/// Handle `restore` command
pub async fn handle_restore(manager: &CheckpointManager, id: String) -> Result<()> {
    let summary = manager.restore_to_checkpoint(&id).await?;

    if summary.rolled_back.is_empty() {
        println!(
            "{}",
            format!("Nothing to restore: no accepted checkpoints since {}", summary.target_id).yellow()
        );
        return Ok(());
    }

    println!("{}", "✓ Restored to checkpoint".green().bold());
    println!("  Target: {}", summary.target_id);
    println!("  Checkpoints undone: {}", summary.rolled_back.len());
    for checkpoint_id in &summary.rolled_back {
        println!("    • {}", checkpoint_id);
    }
    println!("  Changes undone: {}", summary.entries_applied);

    Ok(())
}

/// Handle `delete` command
pub async fn handle_delete(manager: &CheckpointManager, id: String) -> Result<()> {
    if manager.delete_checkpoint(&id).await? {
        println!("{}", "✓ Checkpoint deleted".green().bold());
        println!("  ID: {}", id);
        Ok(())
    } else {
        Err(FlowpointError::checkpoint_not_found(&id))
    }
}

/// Handle `purge` command
///
/// Refuses to run without `confirmed`; the deletion cannot be undone.
pub async fn handle_purge(
    manager: &CheckpointManager,
    case_id: Option<i64>,
    confirmed: bool,
) -> Result<()> {
    let scope = match case_id {
        Some(case_id) => format!("case {}", case_id),
        None => "all cases".to_string(),
    };

    if !confirmed {
        println!(
            "{}",
            format!("This deletes every checkpoint and undo entry for {}. Re-run with --yes to confirm.", scope)
                .yellow()
        );
        return Ok(());
    }

    let deleted = manager.delete_all_checkpoints(case_id).await?;
    println!(
        "{}",
        format!("✓ Deleted {} checkpoints for {}", deleted, scope).green().bold()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a much longer description", 10), "a much ...");
    }

    #[test]
    fn test_format_timestamp_falls_back_to_raw() {
        assert_eq!(format_timestamp("not a date"), "not a date");
        assert_eq!(format_timestamp("2025-01-15T10:30:00.000000Z").len(), 19);
    }
}
