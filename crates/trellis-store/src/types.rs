use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;
use trellis_definition::DomainEvent;

/// Status of an execution run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum RunStatus {
  Pending,
  Running,
  Suspended,
  Completed,
  Failed,
  Cancelled,
}

impl RunStatus {
  pub fn is_terminal(&self) -> bool {
    matches!(
      self,
      RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
    )
  }
}

/// Outcome of one node visit within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ActionStatus {
  Succeeded,
  Failed,
  Skipped,
}

/// One execution of a definition against one triggering event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ExecutionRun {
  pub run_id: String,
  pub definition_id: String,
  /// Version pinned at start; resume reloads exactly this version.
  pub definition_version: i64,
  pub status: RunStatus,
  pub event: Json<DomainEvent>,
  /// Serialized traversal state while the run is suspended at a delay.
  pub cursor: Option<Json<serde_json::Value>>,
  /// When a suspended run becomes due for `resume`.
  pub wake_at: Option<DateTime<Utc>>,
  pub started_at: DateTime<Utc>,
  pub completed_at: Option<DateTime<Utc>>,
}

/// A persisted per-node result. The list for a run is append-only and its
/// order is the order nodes were visited (loop iterations in element order).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ActionResult {
  pub result_id: String,
  pub run_id: String,
  pub node_id: String,
  pub status: ActionStatus,
  pub output: Option<Json<serde_json::Value>>,
  pub error: Option<String>,
  pub created_at: DateTime<Utc>,
}
