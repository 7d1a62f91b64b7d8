//! Built-in action handlers.
//!
//! `WebhookHandler` performs real HTTP delivery. The remaining action types
//! integrate with the surrounding CRM; embedders register their own handlers
//! for those, or use [`AuditLogHandler`] to record the resolved config while
//! wiring things up.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Value, json};
use tracing::info;

use crate::dispatch::{ActionError, ActionHandler, ResolvedConfig};

/// Posts the action config (or its `body` key) as JSON to `url`.
pub struct WebhookHandler {
  client: reqwest::Client,
}

impl WebhookHandler {
  pub fn new() -> Self {
    Self {
      client: reqwest::Client::new(),
    }
  }
}

impl Default for WebhookHandler {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl ActionHandler for WebhookHandler {
  async fn execute(&self, config: &ResolvedConfig) -> Result<Value, ActionError> {
    let url = config
      .get("url")
      .and_then(Value::as_str)
      .ok_or_else(|| ActionError::Permanent("webhook config is missing 'url'".to_string()))?;

    let payload = config
      .get("body")
      .cloned()
      .unwrap_or_else(|| Value::Object(config.clone()));

    let response = self
      .client
      .post(url)
      .json(&payload)
      .send()
      .await
      .map_err(|e| ActionError::Transient(format!("webhook request failed: {e}")))?;

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    classify(status, body)
  }
}

/// Server errors are retried; client errors are the definition's fault and
/// fail the run immediately.
fn classify(status: StatusCode, body: String) -> Result<Value, ActionError> {
  if status.is_server_error() {
    return Err(ActionError::Transient(format!("webhook returned {status}")));
  }
  if !status.is_success() {
    return Err(ActionError::Permanent(format!("webhook returned {status}")));
  }
  Ok(json!({ "status": status.as_u16(), "body": body }))
}

/// Logs the resolved config and echoes it back as the action output. Stands
/// in for CRM-side actions in development and tests.
pub struct AuditLogHandler {
  action: &'static str,
}

impl AuditLogHandler {
  pub fn new(action: &'static str) -> Self {
    Self { action }
  }
}

#[async_trait]
impl ActionHandler for AuditLogHandler {
  async fn execute(&self, config: &ResolvedConfig) -> Result<Value, ActionError> {
    let output = Value::Object(config.clone());
    info!(action = self.action, config = %output, "action executed");
    Ok(output)
  }
}
