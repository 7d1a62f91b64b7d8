use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Serialized traversal state, stored on the run while it is suspended at a
/// delay and replayed on resume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
  /// The node to visit next, i.e. the delay's successor.
  pub next: Option<String>,
  /// Enclosing loop frames, outermost first.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub frames: Vec<LoopFrame>,
  /// Run variables and loop bindings at suspension time.
  #[serde(default, skip_serializing_if = "Map::is_empty")]
  pub vars: Map<String, Value>,
}

/// One in-flight loop: the element currently bound and the elements still to
/// iterate after the body completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopFrame {
  pub loop_id: String,
  pub item_variable: String,
  pub current: Value,
  #[serde(default)]
  pub remaining: Vec<Value>,
}
