use serde::{Deserialize, Serialize};

use crate::edge::Edge;
use crate::node::NodeDef;
use crate::trigger::TriggerSpec;

/// Context roots owned by the system; variables cannot shadow them.
pub const RESERVED_ROOTS: &[&str] = &["record", "user", "now"];

/// Variable names are alphanumeric/underscore and do not start with a digit.
pub fn valid_variable_name(name: &str) -> bool {
  let mut chars = name.chars();
  match chars.next() {
    Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
    _ => return false,
  }
  chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A run-scoped variable declaration with its default value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDef {
  pub name: String,
  #[serde(default)]
  pub default: serde_json::Value,
}

/// A saved workflow definition.
///
/// Definitions are immutable once a run references them: the store assigns a
/// fresh `version` on every save, and runs pin the `(id, version)` pair they
/// were started against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
  pub id: String,
  pub name: String,
  /// The target object type this workflow is attached to (e.g. "deal").
  pub object_id: String,
  pub trigger: TriggerSpec,
  pub nodes: Vec<NodeDef>,
  pub edges: Vec<Edge>,
  #[serde(default = "default_active")]
  pub is_active: bool,
  #[serde(default = "default_version")]
  pub version: i64,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub variables: Vec<VariableDef>,
}

impl WorkflowDefinition {
  pub fn node(&self, id: &str) -> Option<&NodeDef> {
    self.nodes.iter().find(|n| n.id == id)
  }
}

fn default_active() -> bool {
  true
}

fn default_version() -> i64 {
  1
}
