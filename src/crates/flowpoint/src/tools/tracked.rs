//! Row mutations that capture and log their own pre-images
//!
//! Each helper reads the row as it is, performs the mutation, then logs the
//! undo entry through the session in the same call. If no checkpoint is
//! open the mutation still happens but is not reversible.

use crate::error::{FlowpointError, Result};
use crate::models::{RowMap, UndoOperation};
use crate::sql::{bind_all, quote_ident, row_to_map, where_clause};
use crate::tools::ToolContext;
use serde_json::Value;
use tracing::debug;

/// Tracked insert/update/delete over arbitrary business tables
#[derive(Debug, Clone, Copy)]
pub struct TrackedMutations<'a> {
    ctx: &'a ToolContext,
}

impl<'a> TrackedMutations<'a> {
    pub fn new(ctx: &'a ToolContext) -> Self {
        Self { ctx }
    }

    /// Current state of the row identified by `primary_key`
    pub async fn fetch_row(&self, table: &str, primary_key: &RowMap) -> Result<Option<RowMap>> {
        let (predicate, params) = where_clause(primary_key)?;
        let sql = format!("SELECT * FROM {} WHERE {}", quote_ident(table)?, predicate);

        let row = bind_all(sqlx::query(&sql), &params)
            .fetch_optional(self.ctx.database().pool())
            .await?;

        row.as_ref().map(row_to_map).transpose()
    }

    /// Insert a row and log it; returns its primary key
    ///
    /// When `values` lacks `key_column`, the key is taken from SQLite's last
    /// insert rowid, so `key_column` must then be an `INTEGER PRIMARY KEY`.
    pub async fn insert_row(&self, table: &str, values: RowMap, key_column: &str) -> Result<RowMap> {
        let table_sql = quote_ident(table)?;

        let (sql, params) = if values.is_empty() {
            (format!("INSERT INTO {} DEFAULT VALUES", table_sql), Vec::new())
        } else {
            let columns = values
                .keys()
                .map(|c| quote_ident(c))
                .collect::<Result<Vec<_>>>()?;
            let placeholders = vec!["?"; values.len()].join(", ");
            (
                format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    table_sql,
                    columns.join(", "),
                    placeholders
                ),
                values.values().cloned().collect::<Vec<_>>(),
            )
        };

        let result = bind_all(sqlx::query(&sql), &params)
            .execute(self.ctx.database().pool())
            .await?;

        let key_value = values
            .get(key_column)
            .cloned()
            .unwrap_or_else(|| Value::from(result.last_insert_rowid()));
        let mut primary_key = RowMap::new();
        primary_key.insert(key_column.to_string(), key_value);

        self.ctx
            .session()
            .log_operation(UndoOperation::Insert, table, primary_key.clone(), None)
            .await?;

        debug!(table, key = ?primary_key, "Tracked insert");
        Ok(primary_key)
    }

    /// Update columns of one row and log its prior state
    ///
    /// Returns `false` when the row does not exist.
    pub async fn update_row(&self, table: &str, primary_key: RowMap, changes: RowMap) -> Result<bool> {
        if changes.is_empty() {
            return Err(FlowpointError::InvalidEntry(format!(
                "update of {} without any column changes",
                table
            )));
        }

        let Some(pre_image) = self.fetch_row(table, &primary_key).await? else {
            return Ok(false);
        };

        let (predicate, key_params) = where_clause(&primary_key)?;
        let assignments = changes
            .keys()
            .map(|c| quote_ident(c).map(|c| format!("{} = ?", c)))
            .collect::<Result<Vec<_>>>()?;
        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            quote_ident(table)?,
            assignments.join(", "),
            predicate
        );

        let mut params: Vec<Value> = changes.values().cloned().collect();
        params.extend(key_params);

        bind_all(sqlx::query(&sql), &params)
            .execute(self.ctx.database().pool())
            .await?;

        self.ctx
            .session()
            .log_operation(UndoOperation::Update, table, primary_key, Some(pre_image))
            .await?;

        Ok(true)
    }

    /// Delete one row and log its prior state
    ///
    /// Returns `false` when the row does not exist.
    pub async fn delete_row(&self, table: &str, primary_key: RowMap) -> Result<bool> {
        let Some(pre_image) = self.fetch_row(table, &primary_key).await? else {
            return Ok(false);
        };

        let (predicate, params) = where_clause(&primary_key)?;
        let sql = format!("DELETE FROM {} WHERE {}", quote_ident(table)?, predicate);

        bind_all(sqlx::query(&sql), &params)
            .execute(self.ctx.database().pool())
            .await?;

        self.ctx
            .session()
            .log_operation(UndoOperation::Delete, table, primary_key, Some(pre_image))
            .await?;

        Ok(true)
    }
}
