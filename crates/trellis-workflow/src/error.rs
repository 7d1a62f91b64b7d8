use thiserror::Error;
use trellis_definition::{ActionType, Port};

/// A structural problem in a workflow definition, raised at save time and
/// never at run time. The validator collects every violation it finds so an
/// author gets the complete list in one pass.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
  // `source` is off limits as a field name here: thiserror reserves it for
  // the error cause.
  #[error("edge references unknown node: source={source_id}, target={target}")]
  UnknownEdgeNode { source_id: String, target: String },

  #[error("workflow has no trigger node")]
  MissingTrigger,

  #[error("workflow has more than one trigger node: '{node_id}'")]
  ExtraTrigger { node_id: String },

  #[error("trigger node '{node_id}' has incoming edges")]
  TriggerHasIncoming { node_id: String },

  #[error("node '{node_id}' is not reachable from the trigger")]
  Unreachable { node_id: String },

  #[error("node '{node_id}' is missing its '{port}' edge")]
  MissingPort { node_id: String, port: Port },

  #[error("node '{node_id}' has {count} '{port}' edges, expected exactly one")]
  DuplicatePort {
    node_id: String,
    port: Port,
    count: usize,
  },

  #[error("edge from '{node_id}' carries port '{port}' but the node does not branch")]
  UnexpectedPort { node_id: String, port: Port },

  #[error("edge from branching node '{node_id}' is missing a port")]
  UntaggedEdge { node_id: String },

  #[error("edge from '{node_id}' carries invalid port '{port}' for a {kind} node")]
  WrongPort {
    node_id: String,
    port: Port,
    kind: &'static str,
  },

  #[error("node '{node_id}' has multiple outgoing edges")]
  MultipleSuccessors { node_id: String },

  #[error("action node '{node_id}' ({action_type}) is missing required config key '{key}'")]
  MissingConfigKey {
    node_id: String,
    action_type: ActionType,
    key: &'static str,
  },

  #[error("invalid variable name '{name}'")]
  InvalidVariableName { name: String },

  #[error("cycle through node '{node_id}' contains no action node")]
  ActionlessCycle { node_id: String },
}
