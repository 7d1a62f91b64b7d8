//! Action dispatch.
//!
//! Maps an action node to a registered handler and records its outcome.
//! Handlers are registered per action type at startup; the save path
//! rejects definitions whose actions have no handler, so dispatch never
//! sees an unroutable type in normal operation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tracing::warn;
use trellis_definition::ActionType;
use trellis_store::{ActionResult, ActionStatus, Json};

/// Action config after template resolution.
pub type ResolvedConfig = serde_json::Map<String, serde_json::Value>;

/// A handler failure. Transient failures are eligible for retry within the
/// same dispatch; permanent failures fail the run immediately.
#[derive(Debug, Error)]
pub enum ActionError {
  #[error("transient: {0}")]
  Transient(String),

  #[error("{0}")]
  Permanent(String),
}

impl ActionError {
  pub fn is_transient(&self) -> bool {
    matches!(self, ActionError::Transient(_))
  }
}

/// The pluggable implementation behind one action type.
#[async_trait]
pub trait ActionHandler: Send + Sync {
  async fn execute(&self, config: &ResolvedConfig) -> Result<serde_json::Value, ActionError>;
}

/// Bounded retry with exponential backoff, applied to transient failures
/// only. Attempt n sleeps `initial_delay_ms * 2^(n-1)` before retrying.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
  pub max_attempts: u32,
  pub initial_delay_ms: u64,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 3,
      initial_delay_ms: 250,
    }
  }
}

impl RetryPolicy {
  fn backoff(&self, attempt: u32) -> Duration {
    Duration::from_millis(self.initial_delay_ms << (attempt - 1).min(16))
  }
}

/// Registry of action handlers keyed by action type.
#[derive(Default)]
pub struct Dispatcher {
  handlers: HashMap<ActionType, Arc<dyn ActionHandler>>,
  retry: RetryPolicy,
}

impl Dispatcher {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_retry(retry: RetryPolicy) -> Self {
    Self {
      handlers: HashMap::new(),
      retry,
    }
  }

  pub fn register(&mut self, action_type: ActionType, handler: Arc<dyn ActionHandler>) {
    self.handlers.insert(action_type, handler);
  }

  pub fn has_handler(&self, action_type: ActionType) -> bool {
    self.handlers.contains_key(&action_type)
  }

  /// Execute an action and produce its persisted result. Never panics and
  /// never returns an error: every outcome, including a missing handler,
  /// becomes an [`ActionResult`].
  pub async fn dispatch(
    &self,
    run_id: &str,
    node_id: &str,
    action_type: ActionType,
    config: &ResolvedConfig,
  ) -> ActionResult {
    let Some(handler) = self.handlers.get(&action_type) else {
      return failure(run_id, node_id, format!("no handler registered for {action_type}"));
    };

    let mut attempt = 1;
    loop {
      match handler.execute(config).await {
        Ok(output) => {
          return ActionResult {
            result_id: uuid::Uuid::new_v4().to_string(),
            run_id: run_id.to_string(),
            node_id: node_id.to_string(),
            status: ActionStatus::Succeeded,
            output: Some(Json(output)),
            error: None,
            created_at: Utc::now(),
          };
        }
        Err(err) if err.is_transient() && attempt < self.retry.max_attempts => {
          let delay = self.retry.backoff(attempt);
          warn!(
            run_id,
            node_id,
            action_type = %action_type,
            attempt,
            error = %err,
            "transient action failure, retrying"
          );
          tokio::time::sleep(delay).await;
          attempt += 1;
        }
        Err(err) => {
          return failure(run_id, node_id, err.to_string());
        }
      }
    }
  }
}

fn failure(run_id: &str, node_id: &str, error: String) -> ActionResult {
  ActionResult {
    result_id: uuid::Uuid::new_v4().to_string(),
    run_id: run_id.to_string(),
    node_id: node_id.to_string(),
    status: ActionStatus::Failed,
    output: None,
    error: Some(error),
    created_at: Utc::now(),
  }
}
