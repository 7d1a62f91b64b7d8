use serde_json::{Map, Value};
use trellis_definition::{DomainEvent, RESERVED_ROOTS, valid_variable_name};

use crate::error::TemplateError;

/// The data visible to template resolution and condition evaluation during
/// one run: `record.*`, `user.*`, `now`, declared run variables, and the
/// loop item bindings of any enclosing loop bodies.
#[derive(Debug, Clone)]
pub struct Context {
  root: Map<String, Value>,
}

impl Context {
  pub fn new(record: Value, user: Value) -> Self {
    let mut root = Map::new();
    root.insert("record".to_string(), record);
    root.insert("user".to_string(), user);
    root.insert(
      "now".to_string(),
      Value::String(chrono::Utc::now().to_rfc3339()),
    );
    Self { root }
  }

  /// Build a context from the triggering event. `record` is the post-change
  /// snapshot when present, the pre-change snapshot for deletions.
  pub fn from_event(event: &DomainEvent) -> Self {
    Self::new(event.record(), Value::Object(Map::new()))
  }

  /// Declare a run variable. Rejects reserved roots and invalid names.
  pub fn set_var(&mut self, name: &str, value: Value) -> Result<(), TemplateError> {
    if RESERVED_ROOTS.contains(&name) {
      return Err(TemplateError::ReservedName(name.to_string()));
    }
    if !valid_variable_name(name) {
      return Err(TemplateError::InvalidName(name.to_string()));
    }
    self.root.insert(name.to_string(), value);
    Ok(())
  }

  /// Bind a loop item without the reserved-name check. The scheduler owns
  /// these bindings; names are validated when the definition is saved.
  pub fn bind_item(&mut self, name: &str, value: Value) {
    self.root.insert(name.to_string(), value);
  }

  /// Remove a loop item binding when its frame is popped.
  pub fn unbind(&mut self, name: &str) {
    self.root.remove(name);
  }

  /// Look up a dotted path (`record.owner.email`) in the context.
  pub fn lookup(&self, path: &str) -> Option<&Value> {
    let mut parts = path.split('.');
    let mut current = self.root.get(parts.next()?)?;
    for part in parts {
      current = current.get(part)?;
    }
    Some(current)
  }

  /// Run variables and loop bindings, excluding the system roots. Used to
  /// serialize the suspension cursor.
  pub fn variables(&self) -> Map<String, Value> {
    self
      .root
      .iter()
      .filter(|(k, _)| !RESERVED_ROOTS.contains(&k.as_str()))
      .map(|(k, v)| (k.clone(), v.clone()))
      .collect()
  }

  pub(crate) fn root(&self) -> &Map<String, Value> {
    &self.root
  }
}
