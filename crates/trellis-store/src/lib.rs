//! Trellis Store
//!
//! This crate provides the storage trait and implementations for workflow
//! definitions and execution runs. Data is persisted to SQLite (or held in
//! memory for embedding and tests).
//!
//! The [`Store`] trait defines operations for:
//! - Saving definitions (one immutable row per version)
//! - Creating, suspending, resuming and completing runs
//! - Appending per-node results (append-only audit trail)
//! - Finding suspended runs that are due for resumption
//!
//! Concurrent `resume` calls for one run are serialized here:
//! [`Store::claim_resume`] performs an atomic `suspended -> running`
//! transition and every caller but the winner gets [`Error::Conflict`].

mod memory;
mod sqlite;
mod types;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use sqlx::types::Json;
pub use types::{ActionResult, ActionStatus, ExecutionRun, RunStatus};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use trellis_definition::WorkflowDefinition;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The requested record was not found.
  #[error("not found: {0}")]
  NotFound(String),

  /// A state transition lost a race (e.g. a concurrent resume claim).
  #[error("conflict: {0}")]
  Conflict(String),

  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  /// A stored JSON blob failed to (de)serialize.
  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

/// Storage trait for workflow definitions and execution runs.
#[async_trait]
pub trait Store: Send + Sync {
  /// Persist a definition as a new immutable version and return the version
  /// assigned (`max(version) + 1`, starting at 1).
  async fn save_definition(&self, def: &WorkflowDefinition) -> Result<i64, Error>;

  /// Get one exact version of a definition.
  async fn get_definition(&self, id: &str, version: i64) -> Result<WorkflowDefinition, Error>;

  /// Get the latest version of a definition.
  async fn latest_definition(&self, id: &str) -> Result<WorkflowDefinition, Error>;

  /// Latest versions of all active definitions targeting an object type.
  /// Inactive definitions are never returned and so never produce runs.
  async fn active_definitions(&self, object_type: &str) -> Result<Vec<WorkflowDefinition>, Error>;

  /// Create a new execution run.
  async fn create_run(&self, run: &ExecutionRun) -> Result<(), Error>;

  /// Get a run by ID.
  async fn get_run(&self, run_id: &str) -> Result<ExecutionRun, Error>;

  /// Update a run's status. Clears any suspension cursor and wake time.
  async fn update_run_status(
    &self,
    run_id: &str,
    status: RunStatus,
    completed_at: Option<DateTime<Utc>>,
  ) -> Result<(), Error>;

  /// Suspend a run at a delay: store the traversal cursor and wake time and
  /// mark it `suspended`.
  async fn suspend_run(
    &self,
    run_id: &str,
    cursor: &serde_json::Value,
    wake_at: DateTime<Utc>,
  ) -> Result<(), Error>;

  /// Atomically transition a run `suspended -> running` and return it.
  /// Returns [`Error::Conflict`] if the run is not currently suspended, so
  /// only one resume traversal can be active per run.
  async fn claim_resume(&self, run_id: &str) -> Result<ExecutionRun, Error>;

  /// Append a per-node result to a run's audit trail.
  async fn append_result(&self, result: &ActionResult) -> Result<(), Error>;

  /// All results for a run, in visit order.
  async fn list_results(&self, run_id: &str) -> Result<Vec<ActionResult>, Error>;

  /// Suspended runs whose wake time has passed. The external timer feeds
  /// these back into `resume`.
  async fn due_runs(&self, now: DateTime<Utc>) -> Result<Vec<ExecutionRun>, Error>;

  /// Run history for a definition, newest first.
  async fn list_runs(&self, definition_id: &str) -> Result<Vec<ExecutionRun>, Error>;
}
