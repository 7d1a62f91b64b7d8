use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::types::Json;
use trellis_definition::WorkflowDefinition;

use crate::types::{ActionResult, ExecutionRun, RunStatus};
use crate::{Error, Store};

/// SQLite-based store implementation.
pub struct SqliteStore {
  pool: SqlitePool,
}

impl SqliteStore {
  /// Create a new SQLite store with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  /// Open (or create) a database file and run migrations.
  pub async fn open(path: &Path) -> Result<Self, Error> {
    let options = SqliteConnectOptions::new()
      .filename(path)
      .create_if_missing(true);
    let pool = SqlitePool::connect_with(options).await?;
    let store = Self::new(pool);
    store.migrate().await?;
    Ok(store)
  }

  /// Open an in-memory database and run migrations.
  ///
  /// The pool is pinned to a single connection: each SQLite in-memory
  /// connection is its own database.
  pub async fn open_in_memory() -> Result<Self, Error> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
    let pool = SqlitePoolOptions::new()
      .max_connections(1)
      .idle_timeout(None)
      .max_lifetime(None)
      .connect_with(options)
      .await?;
    let store = Self::new(pool);
    store.migrate().await?;
    Ok(store)
  }

  /// Run database migrations.
  pub async fn migrate(&self) -> Result<(), Error> {
    sqlx::migrate!("../../migrations")
      .run(&self.pool)
      .await
      .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))
  }
}

#[async_trait]
impl Store for SqliteStore {
  async fn save_definition(&self, def: &WorkflowDefinition) -> Result<i64, Error> {
    let mut tx = self.pool.begin().await?;

    let current: Option<i64> =
      sqlx::query_scalar("SELECT MAX(version) FROM workflow_definitions WHERE definition_id = ?")
        .bind(&def.id)
        .fetch_one(&mut *tx)
        .await?;
    let version = current.unwrap_or(0) + 1;

    let mut stored = def.clone();
    stored.version = version;
    let blob = serde_json::to_string(&stored)?;

    sqlx::query(
      r#"
            INSERT INTO workflow_definitions (definition_id, version, name, object_id, is_active, definition, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
    )
    .bind(&def.id)
    .bind(version)
    .bind(&def.name)
    .bind(&def.object_id)
    .bind(def.is_active)
    .bind(&blob)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(version)
  }

  async fn get_definition(&self, id: &str, version: i64) -> Result<WorkflowDefinition, Error> {
    let blob: Option<String> = sqlx::query_scalar(
      "SELECT definition FROM workflow_definitions WHERE definition_id = ? AND version = ?",
    )
    .bind(id)
    .bind(version)
    .fetch_optional(&self.pool)
    .await?;

    match blob {
      Some(blob) => Ok(serde_json::from_str(&blob)?),
      None => Err(Error::NotFound(format!("definition {id} v{version}"))),
    }
  }

  async fn latest_definition(&self, id: &str) -> Result<WorkflowDefinition, Error> {
    let blob: Option<String> = sqlx::query_scalar(
      r#"
            SELECT definition FROM workflow_definitions
            WHERE definition_id = ?
            ORDER BY version DESC
            LIMIT 1
            "#,
    )
    .bind(id)
    .fetch_optional(&self.pool)
    .await?;

    match blob {
      Some(blob) => Ok(serde_json::from_str(&blob)?),
      None => Err(Error::NotFound(format!("definition {id}"))),
    }
  }

  async fn active_definitions(&self, object_type: &str) -> Result<Vec<WorkflowDefinition>, Error> {
    let blobs: Vec<String> = sqlx::query_scalar(
      r#"
            SELECT definition FROM workflow_definitions wd
            WHERE object_id = ? AND is_active = 1
              AND version = (
                SELECT MAX(version) FROM workflow_definitions
                WHERE definition_id = wd.definition_id
              )
            "#,
    )
    .bind(object_type)
    .fetch_all(&self.pool)
    .await?;

    blobs
      .iter()
      .map(|blob| serde_json::from_str(blob).map_err(Error::from))
      .collect()
  }

  async fn create_run(&self, run: &ExecutionRun) -> Result<(), Error> {
    sqlx::query(
      r#"
            INSERT INTO execution_runs (run_id, definition_id, definition_version, status, event, cursor, wake_at, started_at, completed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
    )
    .bind(&run.run_id)
    .bind(&run.definition_id)
    .bind(run.definition_version)
    .bind(run.status)
    .bind(&run.event)
    .bind(&run.cursor)
    .bind(run.wake_at)
    .bind(run.started_at)
    .bind(run.completed_at)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn get_run(&self, run_id: &str) -> Result<ExecutionRun, Error> {
    sqlx::query_as(
      r#"
            SELECT run_id, definition_id, definition_version, status, event, cursor, wake_at, started_at, completed_at
            FROM execution_runs
            WHERE run_id = ?
            "#,
    )
    .bind(run_id)
    .fetch_optional(&self.pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("run {run_id}")))
  }

  async fn update_run_status(
    &self,
    run_id: &str,
    status: RunStatus,
    completed_at: Option<DateTime<Utc>>,
  ) -> Result<(), Error> {
    sqlx::query(
      r#"
            UPDATE execution_runs
            SET status = ?, completed_at = ?, cursor = NULL, wake_at = NULL
            WHERE run_id = ?
            "#,
    )
    .bind(status)
    .bind(completed_at)
    .bind(run_id)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn suspend_run(
    &self,
    run_id: &str,
    cursor: &serde_json::Value,
    wake_at: DateTime<Utc>,
  ) -> Result<(), Error> {
    sqlx::query(
      r#"
            UPDATE execution_runs
            SET status = ?, cursor = ?, wake_at = ?
            WHERE run_id = ?
            "#,
    )
    .bind(RunStatus::Suspended)
    .bind(Json(cursor))
    .bind(wake_at)
    .bind(run_id)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn claim_resume(&self, run_id: &str) -> Result<ExecutionRun, Error> {
    let claimed = sqlx::query(
      r#"
            UPDATE execution_runs
            SET status = ?
            WHERE run_id = ? AND status = ?
            "#,
    )
    .bind(RunStatus::Running)
    .bind(run_id)
    .bind(RunStatus::Suspended)
    .execute(&self.pool)
    .await?;

    if claimed.rows_affected() == 0 {
      return Err(Error::Conflict(format!("run {run_id} is not suspended")));
    }

    self.get_run(run_id).await
  }

  async fn append_result(&self, result: &ActionResult) -> Result<(), Error> {
    sqlx::query(
      r#"
            INSERT INTO action_results (result_id, run_id, node_id, status, output, error, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
    )
    .bind(&result.result_id)
    .bind(&result.run_id)
    .bind(&result.node_id)
    .bind(result.status)
    .bind(&result.output)
    .bind(&result.error)
    .bind(result.created_at)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn list_results(&self, run_id: &str) -> Result<Vec<ActionResult>, Error> {
    sqlx::query_as(
      r#"
            SELECT result_id, run_id, node_id, status, output, error, created_at
            FROM action_results
            WHERE run_id = ?
            ORDER BY seq ASC
            "#,
    )
    .bind(run_id)
    .fetch_all(&self.pool)
    .await
    .map_err(Error::from)
  }

  async fn due_runs(&self, now: DateTime<Utc>) -> Result<Vec<ExecutionRun>, Error> {
    sqlx::query_as(
      r#"
            SELECT run_id, definition_id, definition_version, status, event, cursor, wake_at, started_at, completed_at
            FROM execution_runs
            WHERE status = ? AND wake_at <= ?
            ORDER BY wake_at ASC
            "#,
    )
    .bind(RunStatus::Suspended)
    .bind(now)
    .fetch_all(&self.pool)
    .await
    .map_err(Error::from)
  }

  async fn list_runs(&self, definition_id: &str) -> Result<Vec<ExecutionRun>, Error> {
    sqlx::query_as(
      r#"
            SELECT run_id, definition_id, definition_version, status, event, cursor, wake_at, started_at, completed_at
            FROM execution_runs
            WHERE definition_id = ?
            ORDER BY started_at DESC
            "#,
    )
    .bind(definition_id)
    .fetch_all(&self.pool)
    .await
    .map_err(Error::from)
  }
}
