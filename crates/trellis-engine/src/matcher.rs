//! Trigger matching.
//!
//! Decides whether a domain event activates a definition. Synchronous and
//! side-effect-free; a malformed event simply does not match.

use trellis_definition::{DomainEvent, EventType, WorkflowDefinition};

/// Does this event activate this definition's trigger?
pub fn matches(def: &WorkflowDefinition, event: &DomainEvent) -> bool {
  if def.trigger.event_type != event.event_type || def.object_id != event.object_type {
    return false;
  }

  match event.event_type {
    EventType::FieldChanged => match &def.trigger.field {
      // Only the configured field counts; no configured field matches any
      // field change.
      Some(field) => event
        .changed_fields
        .as_deref()
        .is_some_and(|changed| changed.iter().any(|f| f == field)),
      None => true,
    },
    EventType::StageChanged => stage(&event.before) != stage(&event.after),
    _ => true,
  }
}

fn stage(snapshot: &Option<serde_json::Value>) -> Option<&serde_json::Value> {
  snapshot.as_ref().and_then(|v| v.get("stage"))
}
