//! Undo-log repository for database operations

use crate::models::{UndoLogEntry, UndoOperation};
use sqlx::{Executor, Sqlite};

const SELECT_COLUMNS: &str = "SELECT id, checkpoint_id, caseid, sequence, operation, table_name,
            primary_key, previous_data, created_at, applied_at
     FROM undo_log";

/// Values for a new undo-log row
///
/// `primary_key` and `previous_data` are JSON object text.
#[derive(Debug, Clone)]
pub struct NewUndoEntry<'a> {
    pub id: &'a str,
    pub checkpoint_id: &'a str,
    pub case_id: i64,
    pub operation: UndoOperation,
    pub table_name: &'a str,
    pub primary_key: &'a str,
    pub previous_data: Option<&'a str>,
    pub created_at: &'a str,
}

/// Undo-log repository
pub struct UndoLogRepository;

impl UndoLogRepository {
    /// Append an entry to an active checkpoint's log
    ///
    /// The sequence number is computed in the same statement, so concurrent
    /// appends to one checkpoint get distinct, increasing values. Returns
    /// `None` when the checkpoint is missing, no longer active, or belongs to
    /// another case.
    pub async fn append<'e, E>(
        executor: E,
        entry: NewUndoEntry<'_>,
    ) -> Result<Option<UndoLogEntry>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, UndoLogEntry>(
            "INSERT INTO undo_log (id, checkpoint_id, caseid, sequence, operation, table_name,
                                   primary_key, previous_data, created_at)
             SELECT ?1, ?2, ?3,
                    (SELECT COALESCE(MAX(sequence), 0) + 1 FROM undo_log WHERE checkpoint_id = ?2),
                    ?4, ?5, ?6, ?7, ?8
             WHERE EXISTS (SELECT 1 FROM checkpoints WHERE id = ?2 AND caseid = ?3 AND status = 'active')
             RETURNING id, checkpoint_id, caseid, sequence, operation, table_name,
                       primary_key, previous_data, created_at, applied_at",
        )
        .bind(entry.id)
        .bind(entry.checkpoint_id)
        .bind(entry.case_id)
        .bind(entry.operation.as_str())
        .bind(entry.table_name)
        .bind(entry.primary_key)
        .bind(entry.previous_data)
        .bind(entry.created_at)
        // Stepping to completion commits the insert before this returns
        .fetch_all(executor)
        .await
        .map(|rows| rows.into_iter().next())
    }

    /// Entries of a checkpoint in replay order (most recent first)
    pub async fn list_for_replay<'e, E>(
        executor: E,
        checkpoint_id: &str,
    ) -> Result<Vec<UndoLogEntry>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, UndoLogEntry>(&format!(
            "{SELECT_COLUMNS} WHERE checkpoint_id = ? ORDER BY sequence DESC, created_at DESC"
        ))
        .bind(checkpoint_id)
        .fetch_all(executor)
        .await
    }

    /// Entries of a checkpoint in the order they were logged
    pub async fn list_by_checkpoint<'e, E>(
        executor: E,
        checkpoint_id: &str,
    ) -> Result<Vec<UndoLogEntry>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, UndoLogEntry>(&format!(
            "{SELECT_COLUMNS} WHERE checkpoint_id = ? ORDER BY sequence ASC"
        ))
        .bind(checkpoint_id)
        .fetch_all(executor)
        .await
    }

    /// Delete all entries of a checkpoint
    pub async fn delete_by_checkpoint<'e, E>(executor: E, checkpoint_id: &str) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("DELETE FROM undo_log WHERE checkpoint_id = ?")
            .bind(checkpoint_id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete all entries, or only those of one case
    pub async fn delete_all<'e, E>(executor: E, case_id: Option<i64>) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("DELETE FROM undo_log WHERE ?1 IS NULL OR caseid = ?1")
            .bind(case_id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }
}
