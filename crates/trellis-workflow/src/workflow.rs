use trellis_definition::{NodeDef, Port, WorkflowDefinition};

use crate::error::ValidationError;
use crate::graph::Graph;
use crate::validate::validate;

/// A validated workflow ready for traversal.
#[derive(Debug, Clone)]
pub struct Workflow {
  definition: WorkflowDefinition,
  graph: Graph,
  trigger_id: String,
}

impl Workflow {
  /// Validate a definition and build the traversal index.
  pub fn compile(definition: WorkflowDefinition) -> Result<Self, Vec<ValidationError>> {
    validate(&definition)?;
    let graph = Graph::new(&definition.nodes, &definition.edges);
    // validate() guarantees exactly one trigger.
    let trigger_id = definition
      .nodes
      .iter()
      .find(|n| n.is_trigger())
      .map(|n| n.id.clone())
      .ok_or_else(|| vec![ValidationError::MissingTrigger])?;

    Ok(Self {
      definition,
      graph,
      trigger_id,
    })
  }

  pub fn definition(&self) -> &WorkflowDefinition {
    &self.definition
  }

  pub fn node(&self, id: &str) -> Option<&NodeDef> {
    self.definition.node(id)
  }

  pub fn trigger_id(&self) -> &str {
    &self.trigger_id
  }

  /// The first node after the trigger, where traversal begins.
  pub fn entry(&self) -> Option<&str> {
    self.graph.successor(&self.trigger_id, None)
  }

  pub fn successor(&self, node_id: &str, port: Option<Port>) -> Option<&str> {
    self.graph.successor(node_id, port)
  }

  pub fn graph(&self) -> &Graph {
    &self.graph
  }
}
