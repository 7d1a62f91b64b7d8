use serde::{Deserialize, Serialize};

use crate::enums::{ActionType, ComparisonOperator, EventType, LogicOp};

/// A node in the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
  pub id: String,
  #[serde(flatten)]
  pub data: NodeData,
}

impl NodeDef {
  pub fn is_trigger(&self) -> bool {
    matches!(self.data, NodeData::Trigger(_))
  }

  pub fn is_action(&self) -> bool {
    matches!(self.data, NodeData::Action(_))
  }

  /// True for nodes with tagged out-edges (`true`/`false`, `body`/`exit`).
  pub fn is_branching(&self) -> bool {
    matches!(self.data, NodeData::Condition(_) | NodeData::Loop(_))
  }

  pub fn kind(&self) -> &'static str {
    match self.data {
      NodeData::Trigger(_) => "trigger",
      NodeData::Action(_) => "action",
      NodeData::Condition(_) => "condition",
      NodeData::Loop(_) => "loop",
    }
  }
}

/// Node payload, tagged by the node's `type` with the shape under `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum NodeData {
  /// The unique entry point; exactly one per definition.
  Trigger(TriggerData),
  /// A leaf unit of work; config values may embed `{{path}}` tokens.
  Action(ActionData),
  /// Branches on a comparison chain; out-edges tagged `true`/`false`.
  Condition(ConditionData),
  /// Iterates a collection; out-edges tagged `body`/`exit`.
  Loop(LoopData),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerData {
  pub trigger_type: EventType,
  pub object_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionData {
  pub action_type: ActionType,
  #[serde(default)]
  pub config: serde_json::Map<String, serde_json::Value>,
}

/// One comparison clause.
///
/// `logic` joins this clause to the running result of the clauses before it
/// and is ignored on the first clause of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionTerm {
  pub field: String,
  pub operator: ComparisonOperator,
  #[serde(default)]
  pub value: serde_json::Value,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub logic: Option<LogicOp>,
}

/// A condition node's clause list: the primary clause inline plus any
/// further clauses, evaluated strictly left to right.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionData {
  #[serde(flatten)]
  pub first: ConditionTerm,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub conditions: Vec<ConditionTerm>,
}

impl ConditionData {
  /// All clauses in author order.
  pub fn terms(&self) -> impl Iterator<Item = &ConditionTerm> {
    std::iter::once(&self.first).chain(self.conditions.iter())
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopData {
  /// Expression resolving to the sequence to iterate, e.g. `record.contacts`.
  pub collection: String,
  /// Run variable bound to the current element inside the body.
  pub item_variable: String,
}
