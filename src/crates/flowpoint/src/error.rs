//! Error types for flowpoint
//!
//! Storage errors are carried through unmodified; everything else describes
//! a checkpoint-level failure the caller can act on.

use thiserror::Error;

/// Result type alias for flowpoint operations
pub type Result<T> = std::result::Result<T, FlowpointError>;

/// Main error type for checkpoint and undo-log operations
#[derive(Debug, Error)]
pub enum FlowpointError {
    /// Storage-layer error (connection failure, constraint violation, ...)
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    /// Embedded migrations failed to apply
    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Checkpoint (or other record) does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation is not allowed from the checkpoint's current status
    #[error("Cannot {action} checkpoint {id}: status is {status}")]
    InvalidTransition {
        id: String,
        status: String,
        action: &'static str,
    },

    /// Update/delete undo entry without a pre-image
    #[error("Undo entry {entry_id} ({operation}) has no previous data to restore")]
    MissingPreImage { entry_id: String, operation: String },

    /// Operation value outside insert/update/delete, including one read
    /// back from a stored undo entry during replay
    #[error("Unknown undo operation: {0}")]
    UnknownOperation(String),

    /// Undo entry cannot be turned into a compensating statement
    #[error("Invalid undo entry: {0}")]
    InvalidEntry(String),

    /// A checkpoint is already open in this session
    #[error("Checkpoint session already has open checkpoint {0}")]
    SessionAlreadyOpen(String),

    /// No checkpoint is open in this session
    #[error("No open checkpoint in session")]
    NoOpenSession,

    /// Tool invocation failed
    #[error("Tool '{tool}' failed: {message}")]
    Tool { tool: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<sqlx::Error> for FlowpointError {
    /// Row decoding that failed on a flowpoint error (an unknown stored
    /// operation, say) surfaces as that error rather than a column decode.
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::ColumnDecode { index, source } => {
                match source.downcast::<FlowpointError>() {
                    Ok(inner) => *inner,
                    Err(source) => {
                        FlowpointError::Database(sqlx::Error::ColumnDecode { index, source })
                    }
                }
            }
            other => FlowpointError::Database(other),
        }
    }
}

impl FlowpointError {
    /// Create a new NotFound error for a checkpoint id
    pub fn checkpoint_not_found(id: impl AsRef<str>) -> Self {
        FlowpointError::NotFound(format!("checkpoint {}", id.as_ref()))
    }

    /// Create a new Tool error
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        FlowpointError::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, FlowpointError::NotFound(_))
    }

    /// Check if this is an invalid status transition
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, FlowpointError::InvalidTransition { .. })
    }

    /// Check if the storage layer rejected a constraint
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            FlowpointError::Database(sqlx::Error::Database(db_err)) => {
                db_err.is_unique_violation()
                    || db_err.is_foreign_key_violation()
                    || db_err.is_check_violation()
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_error() {
        let err = FlowpointError::checkpoint_not_found("abc");
        assert!(err.is_not_found());
        assert!(!err.is_invalid_transition());
        assert_eq!(err.to_string(), "Not found: checkpoint abc");
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = FlowpointError::InvalidTransition {
            id: "cp-1".to_string(),
            status: "historical".to_string(),
            action: "commit",
        };
        assert!(err.is_invalid_transition());
        assert_eq!(
            err.to_string(),
            "Cannot commit checkpoint cp-1: status is historical"
        );
    }

    #[test]
    fn test_sqlx_error_passes_through() {
        let err: FlowpointError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, FlowpointError::Database(sqlx::Error::RowNotFound)));
        assert!(!err.is_constraint_violation());
    }

    #[test]
    fn test_decoded_flowpoint_error_is_unwrapped() {
        let decode = sqlx::Error::ColumnDecode {
            index: "operation".to_string(),
            source: Box::new(FlowpointError::UnknownOperation("upsert".to_string())),
        };
        let err: FlowpointError = decode.into();
        assert!(matches!(err, FlowpointError::UnknownOperation(ref op) if op == "upsert"));

        let decode = sqlx::Error::ColumnDecode {
            index: "primary_key".to_string(),
            source: Box::new(std::io::Error::new(std::io::ErrorKind::Other, "bad")),
        };
        let err: FlowpointError = decode.into();
        assert!(matches!(
            err,
            FlowpointError::Database(sqlx::Error::ColumnDecode { .. })
        ));
    }

    #[test]
    fn test_tool_error() {
        let err = FlowpointError::tool("create_field", "duplicate name");
        assert_eq!(err.to_string(), "Tool 'create_field' failed: duplicate name");
    }
}
