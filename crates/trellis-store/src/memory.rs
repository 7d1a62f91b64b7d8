use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use trellis_definition::WorkflowDefinition;

use crate::types::{ActionResult, ExecutionRun, RunStatus};
use crate::{Error, Store};

/// In-memory store for embedding and tests. Same semantics as the SQLite
/// store, including the atomic resume claim.
#[derive(Default)]
pub struct MemoryStore {
  inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
  /// (definition_id, version) -> definition.
  definitions: HashMap<(String, i64), WorkflowDefinition>,
  runs: HashMap<String, ExecutionRun>,
  /// run_id -> results in append order.
  results: HashMap<String, Vec<ActionResult>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
    self.inner.lock().unwrap_or_else(|e| e.into_inner())
  }
}

#[async_trait]
impl Store for MemoryStore {
  async fn save_definition(&self, def: &WorkflowDefinition) -> Result<i64, Error> {
    let mut inner = self.lock();
    let version = inner
      .definitions
      .keys()
      .filter(|(id, _)| id == &def.id)
      .map(|(_, v)| *v)
      .max()
      .unwrap_or(0)
      + 1;
    let mut stored = def.clone();
    stored.version = version;
    inner.definitions.insert((def.id.clone(), version), stored);
    Ok(version)
  }

  async fn get_definition(&self, id: &str, version: i64) -> Result<WorkflowDefinition, Error> {
    self
      .lock()
      .definitions
      .get(&(id.to_string(), version))
      .cloned()
      .ok_or_else(|| Error::NotFound(format!("definition {id} v{version}")))
  }

  async fn latest_definition(&self, id: &str) -> Result<WorkflowDefinition, Error> {
    let inner = self.lock();
    inner
      .definitions
      .iter()
      .filter(|((def_id, _), _)| def_id == id)
      .max_by_key(|((_, version), _)| *version)
      .map(|(_, def)| def.clone())
      .ok_or_else(|| Error::NotFound(format!("definition {id}")))
  }

  async fn active_definitions(&self, object_type: &str) -> Result<Vec<WorkflowDefinition>, Error> {
    let inner = self.lock();
    let mut latest: HashMap<&str, &WorkflowDefinition> = HashMap::new();
    for ((id, version), def) in &inner.definitions {
      match latest.get(id.as_str()) {
        Some(existing) if existing.version >= *version => {}
        _ => {
          latest.insert(id.as_str(), def);
        }
      }
    }
    Ok(
      latest
        .into_values()
        .filter(|def| def.is_active && def.object_id == object_type)
        .cloned()
        .collect(),
    )
  }

  async fn create_run(&self, run: &ExecutionRun) -> Result<(), Error> {
    let mut inner = self.lock();
    inner.runs.insert(run.run_id.clone(), run.clone());
    inner.results.entry(run.run_id.clone()).or_default();
    Ok(())
  }

  async fn get_run(&self, run_id: &str) -> Result<ExecutionRun, Error> {
    self
      .lock()
      .runs
      .get(run_id)
      .cloned()
      .ok_or_else(|| Error::NotFound(format!("run {run_id}")))
  }

  async fn update_run_status(
    &self,
    run_id: &str,
    status: RunStatus,
    completed_at: Option<DateTime<Utc>>,
  ) -> Result<(), Error> {
    let mut inner = self.lock();
    let run = inner
      .runs
      .get_mut(run_id)
      .ok_or_else(|| Error::NotFound(format!("run {run_id}")))?;
    run.status = status;
    run.completed_at = completed_at;
    run.cursor = None;
    run.wake_at = None;
    Ok(())
  }

  async fn suspend_run(
    &self,
    run_id: &str,
    cursor: &serde_json::Value,
    wake_at: DateTime<Utc>,
  ) -> Result<(), Error> {
    let mut inner = self.lock();
    let run = inner
      .runs
      .get_mut(run_id)
      .ok_or_else(|| Error::NotFound(format!("run {run_id}")))?;
    run.status = RunStatus::Suspended;
    run.cursor = Some(sqlx::types::Json(cursor.clone()));
    run.wake_at = Some(wake_at);
    Ok(())
  }

  async fn claim_resume(&self, run_id: &str) -> Result<ExecutionRun, Error> {
    let mut inner = self.lock();
    let run = inner
      .runs
      .get_mut(run_id)
      .ok_or_else(|| Error::NotFound(format!("run {run_id}")))?;
    if run.status != RunStatus::Suspended {
      return Err(Error::Conflict(format!("run {run_id} is not suspended")));
    }
    run.status = RunStatus::Running;
    Ok(run.clone())
  }

  async fn append_result(&self, result: &ActionResult) -> Result<(), Error> {
    let mut inner = self.lock();
    inner
      .results
      .entry(result.run_id.clone())
      .or_default()
      .push(result.clone());
    Ok(())
  }

  async fn list_results(&self, run_id: &str) -> Result<Vec<ActionResult>, Error> {
    Ok(self.lock().results.get(run_id).cloned().unwrap_or_default())
  }

  async fn due_runs(&self, now: DateTime<Utc>) -> Result<Vec<ExecutionRun>, Error> {
    let inner = self.lock();
    let mut due: Vec<ExecutionRun> = inner
      .runs
      .values()
      .filter(|run| run.status == RunStatus::Suspended)
      .filter(|run| run.wake_at.is_some_and(|wake| wake <= now))
      .cloned()
      .collect();
    due.sort_by_key(|run| run.wake_at);
    Ok(due)
  }

  async fn list_runs(&self, definition_id: &str) -> Result<Vec<ExecutionRun>, Error> {
    let inner = self.lock();
    let mut runs: Vec<ExecutionRun> = inner
      .runs
      .values()
      .filter(|run| run.definition_id == definition_id)
      .cloned()
      .collect();
    runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    Ok(runs)
  }
}
