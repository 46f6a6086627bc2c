//! Checkpoint repository for database operations

use crate::models::{Checkpoint, CheckpointStatus};
use sqlx::{Executor, Sqlite};

const SELECT_COLUMNS: &str = "SELECT id, caseid, description, user_command, status, created_at,
            finished_at, source, tools_executed, changes_count
     FROM checkpoints";

/// A checkpoint selected for restore, with its insertion order
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct RestoreCandidate {
    pub id: String,
    pub created_at: String,
    pub insertion_order: i64,
}

/// Checkpoint repository for managing checkpoint rows
pub struct CheckpointRepository;

impl CheckpointRepository {
    /// Insert a new checkpoint row
    ///
    /// `tools_json` is the JSON array text stored as `tools_executed`.
    pub async fn create<'e, E>(
        executor: E,
        checkpoint: &Checkpoint,
        tools_json: &str,
    ) -> Result<(), sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            "INSERT INTO checkpoints (id, caseid, description, user_command, status, created_at,
                                      finished_at, source, tools_executed, changes_count)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&checkpoint.id)
        .bind(checkpoint.case_id)
        .bind(&checkpoint.description)
        .bind(&checkpoint.user_command)
        .bind(checkpoint.status.as_str())
        .bind(&checkpoint.created_at)
        .bind(&checkpoint.finished_at)
        .bind(checkpoint.source.as_str())
        .bind(tools_json)
        .bind(checkpoint.changes_count)
        .execute(executor)
        .await?;

        Ok(())
    }

    /// Get a checkpoint by ID
    pub async fn get_by_id<'e, E>(executor: E, id: &str) -> Result<Option<Checkpoint>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Checkpoint>(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// List active checkpoints, newest first, optionally scoped to a case
    pub async fn list_active<'e, E>(
        executor: E,
        case_id: Option<i64>,
    ) -> Result<Vec<Checkpoint>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Checkpoint>(&format!(
            "{SELECT_COLUMNS}
             WHERE status = 'active' AND (?1 IS NULL OR caseid = ?1)
             ORDER BY created_at DESC, rowid DESC"
        ))
        .bind(case_id)
        .fetch_all(executor)
        .await
    }

    /// List finished checkpoints, newest first, optionally scoped to a case
    pub async fn list_history<'e, E>(
        executor: E,
        case_id: Option<i64>,
        limit: u32,
    ) -> Result<Vec<Checkpoint>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Checkpoint>(&format!(
            "{SELECT_COLUMNS}
             WHERE status != 'active' AND (?1 IS NULL OR caseid = ?1)
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?2"
        ))
        .bind(case_id)
        .bind(i64::from(limit))
        .fetch_all(executor)
        .await
    }

    /// Mark an active checkpoint historical and snapshot its change count
    ///
    /// Returns `None` when the checkpoint does not exist or is not active.
    pub async fn mark_historical<'e, E>(
        executor: E,
        id: &str,
        finished_at: &str,
    ) -> Result<Option<Checkpoint>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Checkpoint>(
            "UPDATE checkpoints
             SET status = 'historical',
                 finished_at = ?1,
                 changes_count = (SELECT COUNT(*) FROM undo_log WHERE checkpoint_id = ?2)
             WHERE id = ?2 AND status = 'active'
             RETURNING id, caseid, description, user_command, status, created_at,
                       finished_at, source, tools_executed, changes_count",
        )
        .bind(finished_at)
        .bind(id)
        // Stepping to completion commits the update before this returns
        .fetch_all(executor)
        .await
        .map(|rows| rows.into_iter().next())
    }

    /// Mark a checkpoint rolled back if its status is one of `from`
    ///
    /// Returns whether a row changed.
    pub async fn mark_rolled_back<'e, E>(
        executor: E,
        id: &str,
        from: CheckpointStatus,
        finished_at: &str,
    ) -> Result<bool, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            "UPDATE checkpoints SET status = 'rolled_back', finished_at = ?1
             WHERE id = ?2 AND status = ?3",
        )
        .bind(finished_at)
        .bind(id)
        .bind(from.as_str())
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark every restorable checkpoint at or after `target` rolled back
    ///
    /// Covers checkpoints created after the target plus those sharing its
    /// timestamp that were inserted no earlier than it. Returns them in
    /// arbitrary order; callers sort.
    pub async fn mark_restorable_since_rolled_back<'e, E>(
        executor: E,
        target: &Checkpoint,
        finished_at: &str,
    ) -> Result<Vec<RestoreCandidate>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, RestoreCandidate>(
            "UPDATE checkpoints
             SET status = 'rolled_back', finished_at = ?1
             WHERE status IN ('historical', 'committed')
               AND (created_at > ?2
                    OR (created_at = ?2
                        AND rowid >= (SELECT rowid FROM checkpoints WHERE id = ?3)))
             RETURNING id, created_at, rowid AS insertion_order",
        )
        .bind(finished_at)
        .bind(&target.created_at)
        .bind(&target.id)
        .fetch_all(executor)
        .await
    }

    /// Append a tool name to `tools_executed`; returns whether the row exists
    pub async fn append_tool<'e, E>(executor: E, id: &str, tool_name: &str) -> Result<bool, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            "UPDATE checkpoints SET tools_executed = json_insert(tools_executed, '$[#]', ?1)
             WHERE id = ?2",
        )
        .bind(tool_name)
        .bind(id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a checkpoint
    pub async fn delete<'e, E>(executor: E, id: &str) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("DELETE FROM checkpoints WHERE id = ?")
            .bind(id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete all checkpoints, or only those of one case
    pub async fn delete_all<'e, E>(executor: E, case_id: Option<i64>) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("DELETE FROM checkpoints WHERE ?1 IS NULL OR caseid = ?1")
            .bind(case_id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }
}
