//! Data models for checkpoints and undo-log entries
//!
//! Timestamps are stored as RFC 3339 UTC strings with microsecond precision
//! so that text ordering in SQLite matches chronological ordering.

pub mod checkpoint;
pub mod undo_entry;

pub use checkpoint::{Checkpoint, CheckpointSource, CheckpointStatus};
pub use undo_entry::{RowMap, UndoLogEntry, UndoOperation};

use chrono::{SecondsFormat, Utc};

/// Current time in the storage timestamp format
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
