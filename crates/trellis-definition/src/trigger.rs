use serde::{Deserialize, Serialize};

use crate::enums::EventType;

/// The trigger spec attached to a definition: which event kind activates it,
/// and for `FIELD_CHANGED` triggers, which field to watch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerSpec {
  #[serde(rename = "type")]
  pub event_type: EventType,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub field: Option<String>,
}
