//! Repository pattern implementations for the checkpoint and undo-log tables
//!
//! Every function is generic over the sqlx executor so the same query runs
//! against the pool (single-statement operations) or inside a transaction
//! (rollback, restore, bulk delete).

pub mod checkpoint_repository;
pub mod undo_log_repository;

pub use checkpoint_repository::CheckpointRepository;
pub use undo_log_repository::{NewUndoEntry, UndoLogRepository};
