use serde::{Deserialize, Serialize};

use crate::enums::Port;

/// A directed edge between two nodes.
///
/// `source_port` is required when the source is a branching node (condition
/// or loop) and absent otherwise; the validator enforces this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
  pub source: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub source_port: Option<Port>,
  pub target: String,
}
