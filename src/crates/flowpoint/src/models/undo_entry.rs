//! Undo-log entry model: one reversible mutation of a business table

use crate::error::FlowpointError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};
use std::fmt;
use std::str::FromStr;

/// Column name → value map used for primary keys and row pre-images
pub type RowMap = serde_json::Map<String, Value>;

/// The kind of mutation that was performed (not the undo action)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UndoOperation {
    Insert,
    Update,
    Delete,
}

impl UndoOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Update and delete can only be undone from the prior row image
    pub fn requires_pre_image(&self) -> bool {
        matches!(self, Self::Update | Self::Delete)
    }
}

impl fmt::Display for UndoOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for UndoOperation {
    type Err = FlowpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "insert" => Ok(Self::Insert),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(FlowpointError::UnknownOperation(other.to_string())),
        }
    }
}

/// An undo_log row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndoLogEntry {
    pub id: String,
    pub checkpoint_id: String,
    pub case_id: i64,

    /// Position within the checkpoint, strictly increasing in log order
    pub sequence: i64,

    pub operation: UndoOperation,
    pub table_name: String,
    pub primary_key: RowMap,

    /// Full row before the mutation; `None` for inserts
    pub previous_data: Option<RowMap>,

    pub created_at: String,
    pub applied_at: Option<String>,
}

fn decode_err(column: &str, source: impl std::error::Error + Send + Sync + 'static) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(source),
    }
}

impl<'r> FromRow<'r, SqliteRow> for UndoLogEntry {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let operation: String = row.try_get("operation")?;
        let primary_key: String = row.try_get("primary_key")?;
        let previous_data: Option<String> = row.try_get("previous_data")?;

        let previous_data = match previous_data {
            Some(raw) => {
                let value: Value =
                    serde_json::from_str(&raw).map_err(|e| decode_err("previous_data", e))?;
                match value {
                    Value::Object(map) => Some(map),
                    // JSON null stored as text counts as an absent pre-image
                    _ => None,
                }
            }
            None => None,
        };

        Ok(Self {
            id: row.try_get("id")?,
            checkpoint_id: row.try_get("checkpoint_id")?,
            case_id: row.try_get("caseid")?,
            sequence: row.try_get("sequence")?,
            operation: operation
                .parse()
                .map_err(|e: FlowpointError| decode_err("operation", e))?,
            table_name: row.try_get("table_name")?,
            primary_key: serde_json::from_str(&primary_key)
                .map_err(|e| decode_err("primary_key", e))?,
            previous_data,
            created_at: row.try_get("created_at")?,
            applied_at: row.try_get("applied_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_parsing() {
        assert_eq!("insert".parse::<UndoOperation>().unwrap(), UndoOperation::Insert);
        assert_eq!("delete".parse::<UndoOperation>().unwrap(), UndoOperation::Delete);

        let err = "upsert".parse::<UndoOperation>().unwrap_err();
        assert!(matches!(err, FlowpointError::UnknownOperation(op) if op == "upsert"));
    }

    #[test]
    fn test_pre_image_requirement() {
        assert!(!UndoOperation::Insert.requires_pre_image());
        assert!(UndoOperation::Update.requires_pre_image());
        assert!(UndoOperation::Delete.requires_pre_image());
    }
}
