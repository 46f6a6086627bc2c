//! Compensating actions for undo-log entries
//!
//! | Original | Undo                                                      |
//! |----------|-----------------------------------------------------------|
//! | insert   | `DELETE FROM t WHERE <pk>`                                |
//! | delete   | `INSERT INTO t (<pre-image minus pk>) VALUES (...)`       |
//! | update   | `UPDATE t SET <pre-image minus pk> WHERE <pk>`            |
//!
//! Key columns are never written back: the storage layer reassigns identity
//! on delete-undo, so the restored row is equivalent but may carry a new key.

use crate::error::{FlowpointError, Result};
use crate::models::{RowMap, UndoLogEntry, UndoOperation};
use crate::sql::{bind_all, quote_ident, where_clause};
use serde_json::Value;
use sqlx::SqliteConnection;
use tracing::debug;

/// A parameterised statement that reverses one logged mutation
#[derive(Debug, Clone, PartialEq)]
pub struct CompensatingStatement {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Pre-image columns that are not part of the primary key
fn non_key_columns<'a>(pre_image: &'a RowMap, key: &RowMap) -> Vec<(&'a String, &'a Value)> {
    pre_image
        .iter()
        .filter(|(column, _)| !key.contains_key(column.as_str()))
        .collect()
}

fn require_pre_image(entry: &UndoLogEntry) -> Result<&RowMap> {
    entry
        .previous_data
        .as_ref()
        .ok_or_else(|| FlowpointError::MissingPreImage {
            entry_id: entry.id.clone(),
            operation: entry.operation.to_string(),
        })
}

/// Build the statement undoing `entry`
///
/// Returns `Ok(None)` when there is nothing to restore (an update whose
/// pre-image holds only key columns).
pub fn compensating_statement(entry: &UndoLogEntry) -> Result<Option<CompensatingStatement>> {
    let table = quote_ident(&entry.table_name)?;

    match entry.operation {
        UndoOperation::Insert => {
            let (predicate, params) = where_clause(&entry.primary_key)?;
            Ok(Some(CompensatingStatement {
                sql: format!("DELETE FROM {} WHERE {}", table, predicate),
                params,
            }))
        }
        UndoOperation::Delete => {
            let pre_image = require_pre_image(entry)?;
            let columns = non_key_columns(pre_image, &entry.primary_key);

            if columns.is_empty() {
                return Ok(Some(CompensatingStatement {
                    sql: format!("INSERT INTO {} DEFAULT VALUES", table),
                    params: Vec::new(),
                }));
            }

            let names = columns
                .iter()
                .map(|(column, _)| quote_ident(column))
                .collect::<Result<Vec<_>>>()?;
            let placeholders = vec!["?"; columns.len()].join(", ");

            Ok(Some(CompensatingStatement {
                sql: format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    table,
                    names.join(", "),
                    placeholders
                ),
                params: columns.into_iter().map(|(_, value)| value.clone()).collect(),
            }))
        }
        UndoOperation::Update => {
            let pre_image = require_pre_image(entry)?;
            let columns = non_key_columns(pre_image, &entry.primary_key);

            if columns.is_empty() {
                return Ok(None);
            }

            let (predicate, key_params) = where_clause(&entry.primary_key)?;
            let assignments = columns
                .iter()
                .map(|(column, _)| quote_ident(column).map(|c| format!("{} = ?", c)))
                .collect::<Result<Vec<_>>>()?;

            let mut params: Vec<Value> =
                columns.into_iter().map(|(_, value)| value.clone()).collect();
            params.extend(key_params);

            Ok(Some(CompensatingStatement {
                sql: format!(
                    "UPDATE {} SET {} WHERE {}",
                    table,
                    assignments.join(", "),
                    predicate
                ),
                params,
            }))
        }
    }
}

/// Apply the compensating action of each entry, in the given order
///
/// Callers pass entries most-recent-first and run this inside a transaction;
/// the first failure stops replay and is returned. Returns the number of
/// statements executed.
pub async fn apply_entries(conn: &mut SqliteConnection, entries: &[UndoLogEntry]) -> Result<usize> {
    let mut applied = 0;

    for entry in entries {
        let Some(statement) = compensating_statement(entry)? else {
            debug!(entry_id = %entry.id, table = %entry.table_name, "Update pre-image has no non-key columns, skipping");
            continue;
        };

        let result = bind_all(sqlx::query(&statement.sql), &statement.params)
            .execute(&mut *conn)
            .await?;

        debug!(
            entry_id = %entry.id,
            sequence = entry.sequence,
            operation = %entry.operation,
            table = %entry.table_name,
            rows = result.rows_affected(),
            "Applied compensating action"
        );
        applied += 1;
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(operation: UndoOperation, key: Value, previous: Option<Value>) -> UndoLogEntry {
        UndoLogEntry {
            id: "entry-1".to_string(),
            checkpoint_id: "cp-1".to_string(),
            case_id: 7,
            sequence: 1,
            operation,
            table_name: "Fields".to_string(),
            primary_key: key.as_object().cloned().unwrap(),
            previous_data: previous.map(|v| v.as_object().cloned().unwrap()),
            created_at: "2025-01-01T00:00:00.000000Z".to_string(),
            applied_at: None,
        }
    }

    #[test]
    fn test_insert_undo_deletes_by_key() {
        let stmt = compensating_statement(&entry(UndoOperation::Insert, json!({"id": 1}), None))
            .unwrap()
            .unwrap();
        assert_eq!(stmt.sql, "DELETE FROM \"Fields\" WHERE \"id\" = ?");
        assert_eq!(stmt.params, vec![json!(1)]);
    }

    #[test]
    fn test_delete_undo_reinserts_without_key() {
        let stmt = compensating_statement(&entry(
            UndoOperation::Delete,
            json!({"id": 5}),
            Some(json!({"id": 5, "label": "Old", "caseid": 7})),
        ))
        .unwrap()
        .unwrap();

        assert_eq!(
            stmt.sql,
            "INSERT INTO \"Fields\" (\"caseid\", \"label\") VALUES (?, ?)"
        );
        assert_eq!(stmt.params, vec![json!(7), json!("Old")]);
    }

    #[test]
    fn test_update_undo_restores_non_key_columns() {
        let stmt = compensating_statement(&entry(
            UndoOperation::Update,
            json!({"id": 5}),
            Some(json!({"id": 5, "label": "Old", "required": false})),
        ))
        .unwrap()
        .unwrap();

        assert_eq!(
            stmt.sql,
            "UPDATE \"Fields\" SET \"label\" = ?, \"required\" = ? WHERE \"id\" = ?"
        );
        assert_eq!(stmt.params, vec![json!("Old"), json!(false), json!(5)]);
    }

    #[test]
    fn test_update_with_only_key_columns_is_noop() {
        let stmt = compensating_statement(&entry(
            UndoOperation::Update,
            json!({"id": 5}),
            Some(json!({"id": 5})),
        ))
        .unwrap();
        assert!(stmt.is_none());
    }

    #[test]
    fn test_missing_pre_image_is_fatal() {
        for op in [UndoOperation::Update, UndoOperation::Delete] {
            let err = compensating_statement(&entry(op, json!({"id": 5}), None)).unwrap_err();
            assert!(matches!(err, FlowpointError::MissingPreImage { .. }));
        }
    }

    #[test]
    fn test_empty_key_is_rejected() {
        let err = compensating_statement(&entry(UndoOperation::Insert, json!({}), None)).unwrap_err();
        assert!(matches!(err, FlowpointError::InvalidEntry(_)));
    }
}
