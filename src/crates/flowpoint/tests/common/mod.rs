//! Common test utilities and setup
#![allow(dead_code)]

use flowpoint::{CheckpointManager, Database, RowMap};
use serde_json::{json, Value};
use sqlx::Row;
use std::sync::Arc;
use tempfile::TempDir;

/// Business table the tests mutate and undo
const FIELDS_SCHEMA: &str = "CREATE TABLE fields (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    caseid INTEGER NOT NULL REFERENCES cases(id),
    name TEXT NOT NULL,
    label TEXT,
    required INTEGER NOT NULL DEFAULT 0
)";

pub struct TestEnv {
    /// Keeps the database directory alive for the test
    pub dir: TempDir,
    pub db: Database,
    pub manager: Arc<CheckpointManager>,
    pub case_id: i64,
}

/// Create a migrated database with one case and an empty `fields` table
pub async fn setup() -> TestEnv {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let db = Database::initialize(dir.path().join("flowpoint.db"))
        .await
        .expect("Failed to create test database");

    sqlx::query(FIELDS_SCHEMA)
        .execute(db.pool())
        .await
        .expect("Failed to create fields table");

    let case_id = create_case(&db, "Test case").await;
    let manager = Arc::new(CheckpointManager::new(db.clone()));

    TestEnv {
        dir,
        db,
        manager,
        case_id,
    }
}

pub async fn create_case(db: &Database, name: &str) -> i64 {
    sqlx::query("INSERT INTO cases (name) VALUES (?)")
        .bind(name)
        .execute(db.pool())
        .await
        .expect("Failed to create case")
        .last_insert_rowid()
}

/// Build a row map from a JSON object literal
pub fn row(value: Value) -> RowMap {
    value.as_object().cloned().expect("row literal must be an object")
}

pub fn key(id: i64) -> RowMap {
    row(json!({ "id": id }))
}

pub async fn insert_field(db: &Database, case_id: i64, name: &str, label: &str) -> i64 {
    sqlx::query("INSERT INTO fields (caseid, name, label) VALUES (?, ?, ?)")
        .bind(case_id)
        .bind(name)
        .bind(label)
        .execute(db.pool())
        .await
        .expect("Failed to insert field")
        .last_insert_rowid()
}

/// Full row as stored, for pre-images
pub async fn field_row(db: &Database, id: i64) -> Option<RowMap> {
    sqlx::query("SELECT id, caseid, name, label, required FROM fields WHERE id = ?")
        .bind(id)
        .fetch_optional(db.pool())
        .await
        .expect("Failed to read field")
        .map(|r| {
            row(json!({
                "id": r.get::<i64, _>("id"),
                "caseid": r.get::<i64, _>("caseid"),
                "name": r.get::<String, _>("name"),
                "label": r.get::<Option<String>, _>("label"),
                "required": r.get::<i64, _>("required"),
            }))
        })
}

pub async fn set_label(db: &Database, id: i64, label: &str) {
    sqlx::query("UPDATE fields SET label = ? WHERE id = ?")
        .bind(label)
        .bind(id)
        .execute(db.pool())
        .await
        .expect("Failed to update field");
}

pub async fn delete_field(db: &Database, id: i64) {
    sqlx::query("DELETE FROM fields WHERE id = ?")
        .bind(id)
        .execute(db.pool())
        .await
        .expect("Failed to delete field");
}

pub async fn field_count(db: &Database) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM fields")
        .fetch_one(db.pool())
        .await
        .expect("Failed to count fields")
}

/// (name, label) of every field, ordered by name
pub async fn field_labels(db: &Database) -> Vec<(String, Option<String>)> {
    sqlx::query_as("SELECT name, label FROM fields ORDER BY name")
        .fetch_all(db.pool())
        .await
        .expect("Failed to list fields")
}

pub async fn label_of(db: &Database, id: i64) -> Option<String> {
    sqlx::query_scalar::<_, Option<String>>("SELECT label FROM fields WHERE id = ?")
        .bind(id)
        .fetch_optional(db.pool())
        .await
        .expect("Failed to read label")
        .flatten()
}
