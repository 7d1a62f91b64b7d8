use serde::{Deserialize, Serialize};

use crate::enums::EventType;

/// A domain event consumed from the surrounding record system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
  pub event_type: EventType,
  pub object_type: String,
  pub record_id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub before: Option<serde_json::Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub after: Option<serde_json::Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub changed_fields: Option<Vec<String>>,
}

impl DomainEvent {
  /// The record snapshot templates see as `record.*`: the post-change state
  /// when present, otherwise the pre-change state (deletions).
  pub fn record(&self) -> serde_json::Value {
    self
      .after
      .clone()
      .or_else(|| self.before.clone())
      .unwrap_or(serde_json::Value::Object(serde_json::Map::new()))
  }
}
