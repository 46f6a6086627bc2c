//! Checkpoint model: one logical, multi-statement transaction

use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a checkpoint
///
/// `Committed` is transient: commit lands directly on `Historical`, which is
/// the durable "accepted" state. `RolledBack` is the durable "undone" state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    Active,
    Committed,
    RolledBack,
    Historical,
}

impl CheckpointStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
            Self::Historical => "historical",
        }
    }

    /// Whether no further commit/rollback is accepted
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }

    /// Whether restore-to-checkpoint may undo this checkpoint after the fact
    pub fn is_restorable(&self) -> bool {
        matches!(self, Self::Historical | Self::Committed)
    }
}

impl fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CheckpointStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "committed" => Ok(Self::Committed),
            "rolled_back" => Ok(Self::RolledBack),
            "historical" => Ok(Self::Historical),
            other => Err(format!("unknown checkpoint status '{}'", other)),
        }
    }
}

/// Who opened the checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckpointSource {
    #[default]
    Llm,
    Mcp,
    Api,
}

impl CheckpointSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Llm => "LLM",
            Self::Mcp => "MCP",
            Self::Api => "API",
        }
    }
}

impl fmt::Display for CheckpointSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CheckpointSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LLM" => Ok(Self::Llm),
            "MCP" => Ok(Self::Mcp),
            "API" => Ok(Self::Api),
            _ => Err(format!("unknown checkpoint source '{}'", s)),
        }
    }
}

/// A checkpoint row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Unique checkpoint identifier (UUID string)
    pub id: String,

    /// Case (workflow/object) the checkpoint is attributed to
    pub case_id: i64,

    /// Free-form description
    pub description: Option<String>,

    /// The user request that triggered the batch
    pub user_command: Option<String>,

    /// Lifecycle status
    pub status: CheckpointStatus,

    /// Originating surface
    pub source: CheckpointSource,

    /// Creation timestamp (RFC 3339)
    pub created_at: String,

    /// Set once the checkpoint reaches a terminal status
    pub finished_at: Option<String>,

    /// Tool names invoked under this checkpoint, in call order
    pub tools_executed: Vec<String>,

    /// Undo entries recorded, snapshotted at commit
    pub changes_count: i64,
}

impl Checkpoint {
    pub fn is_active(&self) -> bool {
        self.status == CheckpointStatus::Active
    }
}

fn decode_err(column: &str, message: String) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: message.into(),
    }
}

impl<'r> FromRow<'r, SqliteRow> for Checkpoint {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        let source: String = row.try_get("source")?;
        let tools_executed: String = row.try_get("tools_executed")?;

        Ok(Self {
            id: row.try_get("id")?,
            case_id: row.try_get("caseid")?,
            description: row.try_get("description")?,
            user_command: row.try_get("user_command")?,
            status: status.parse().map_err(|e| decode_err("status", e))?,
            source: source.parse().map_err(|e| decode_err("source", e))?,
            created_at: row.try_get("created_at")?,
            finished_at: row.try_get("finished_at")?,
            tools_executed: serde_json::from_str(&tools_executed)
                .map_err(|e| decode_err("tools_executed", e.to_string()))?,
            changes_count: row.try_get("changes_count")?,
        })
    }
}
