//! Structural validation of workflow definitions.
//!
//! Runs at save time, never at run time. All checks execute and every
//! violation is returned, so an author sees the complete error list instead
//! of fixing one problem per attempt.

use std::collections::{HashMap, HashSet};

use trellis_definition::{
  NodeData, NodeDef, Port, RESERVED_ROOTS, WorkflowDefinition, valid_variable_name,
};

use crate::error::ValidationError;
use crate::graph::Graph;

/// Validate a definition, returning every structural violation found.
pub fn validate(def: &WorkflowDefinition) -> Result<(), Vec<ValidationError>> {
  let mut errors = Vec::new();
  let graph = Graph::new(&def.nodes, &def.edges);

  check_edge_endpoints(def, &mut errors);
  let trigger_id = check_trigger(def, &graph, &mut errors);
  if let Some(trigger_id) = &trigger_id {
    check_reachability(def, &graph, trigger_id, &mut errors);
  }
  for node in &def.nodes {
    check_out_edges(node, &graph, &mut errors);
  }
  check_action_configs(def, &mut errors);
  check_variable_names(def, &mut errors);
  check_cycles(def, &graph, &mut errors);

  if errors.is_empty() { Ok(()) } else { Err(errors) }
}

fn check_edge_endpoints(def: &WorkflowDefinition, errors: &mut Vec<ValidationError>) {
  let ids: HashSet<&str> = def.nodes.iter().map(|n| n.id.as_str()).collect();
  for edge in &def.edges {
    if !ids.contains(edge.source.as_str()) || !ids.contains(edge.target.as_str()) {
      errors.push(ValidationError::UnknownEdgeNode {
        source_id: edge.source.clone(),
        target: edge.target.clone(),
      });
    }
  }
}

/// Exactly one trigger node, and it must have no incoming edges.
fn check_trigger(
  def: &WorkflowDefinition,
  graph: &Graph,
  errors: &mut Vec<ValidationError>,
) -> Option<String> {
  let mut triggers = def.nodes.iter().filter(|n| n.is_trigger());
  let first = triggers.next();

  match first {
    None => {
      errors.push(ValidationError::MissingTrigger);
      None
    }
    Some(trigger) => {
      for extra in triggers {
        errors.push(ValidationError::ExtraTrigger {
          node_id: extra.id.clone(),
        });
      }
      if !graph.incoming(&trigger.id).is_empty() {
        errors.push(ValidationError::TriggerHasIncoming {
          node_id: trigger.id.clone(),
        });
      }
      Some(trigger.id.clone())
    }
  }
}

fn check_reachability(
  def: &WorkflowDefinition,
  graph: &Graph,
  trigger_id: &str,
  errors: &mut Vec<ValidationError>,
) {
  let reachable = graph.reachable_from(trigger_id);
  for node in &def.nodes {
    if !reachable.contains(&node.id) {
      errors.push(ValidationError::Unreachable {
        node_id: node.id.clone(),
      });
    }
  }
}

/// Branch nodes need exactly their two tagged out-edges; linear nodes take
/// at most one untagged out-edge.
fn check_out_edges(node: &NodeDef, graph: &Graph, errors: &mut Vec<ValidationError>) {
  let outgoing = graph.outgoing(&node.id);

  let required: &[Port] = match &node.data {
    NodeData::Condition(_) => &[Port::True, Port::False],
    NodeData::Loop(_) => &[Port::Body, Port::Exit],
    NodeData::Trigger(_) | NodeData::Action(_) => {
      for (port, _) in outgoing {
        if let Some(port) = port {
          errors.push(ValidationError::UnexpectedPort {
            node_id: node.id.clone(),
            port: *port,
          });
        }
      }
      if outgoing.len() > 1 {
        errors.push(ValidationError::MultipleSuccessors {
          node_id: node.id.clone(),
        });
      }
      return;
    }
  };

  let mut counts: HashMap<Port, usize> = HashMap::new();
  for (port, _) in outgoing {
    match port {
      None => errors.push(ValidationError::UntaggedEdge {
        node_id: node.id.clone(),
      }),
      Some(port) if required.contains(port) => {
        *counts.entry(*port).or_default() += 1;
      }
      Some(port) => errors.push(ValidationError::WrongPort {
        node_id: node.id.clone(),
        port: *port,
        kind: node.kind(),
      }),
    }
  }

  for port in required {
    match counts.get(port).copied().unwrap_or(0) {
      0 => errors.push(ValidationError::MissingPort {
        node_id: node.id.clone(),
        port: *port,
      }),
      1 => {}
      count => errors.push(ValidationError::DuplicatePort {
        node_id: node.id.clone(),
        port: *port,
        count,
      }),
    }
  }
}

/// Required config keys must be present with a non-empty value.
fn check_action_configs(def: &WorkflowDefinition, errors: &mut Vec<ValidationError>) {
  for node in &def.nodes {
    let NodeData::Action(action) = &node.data else {
      continue;
    };
    for key in action.action_type.required_keys() {
      let missing = match action.config.get(*key) {
        None | Some(serde_json::Value::Null) => true,
        Some(serde_json::Value::String(s)) => s.is_empty(),
        Some(_) => false,
      };
      if missing {
        errors.push(ValidationError::MissingConfigKey {
          node_id: node.id.clone(),
          action_type: action.action_type,
          key,
        });
      }
    }
  }
}

fn check_variable_names(def: &WorkflowDefinition, errors: &mut Vec<ValidationError>) {
  let mut check = |name: &str| {
    if !valid_variable_name(name) || RESERVED_ROOTS.contains(&name) {
      errors.push(ValidationError::InvalidVariableName {
        name: name.to_string(),
      });
    }
  };
  for var in &def.variables {
    check(&var.name);
  }
  for node in &def.nodes {
    if let NodeData::Loop(data) = &node.data {
      check(&data.item_variable);
    }
  }
}

/// Any strongly connected component with a cycle must contain at least one
/// action node; a side-effect-free cycle would spin forever.
fn check_cycles(def: &WorkflowDefinition, graph: &Graph, errors: &mut Vec<ValidationError>) {
  let actions: HashSet<&str> = def
    .nodes
    .iter()
    .filter(|n| n.is_action())
    .map(|n| n.id.as_str())
    .collect();

  for scc in strongly_connected_components(def, graph) {
    let cyclic = scc.len() > 1
      || scc
        .first()
        .is_some_and(|id| graph.outgoing(id).iter().any(|(_, t)| t == id));
    if !cyclic {
      continue;
    }
    if !scc.iter().any(|id| actions.contains(id.as_str())) {
      let mut members = scc.clone();
      members.sort();
      errors.push(ValidationError::ActionlessCycle {
        node_id: members.remove(0),
      });
    }
  }
}

/// Tarjan's algorithm.
fn strongly_connected_components(def: &WorkflowDefinition, graph: &Graph) -> Vec<Vec<String>> {
  struct State<'a> {
    graph: &'a Graph,
    index: usize,
    indices: HashMap<&'a str, usize>,
    lowlinks: HashMap<&'a str, usize>,
    stack: Vec<&'a str>,
    on_stack: HashSet<&'a str>,
    components: Vec<Vec<String>>,
  }

  fn connect<'a>(node: &'a str, state: &mut State<'a>) {
    state.indices.insert(node, state.index);
    state.lowlinks.insert(node, state.index);
    state.index += 1;
    state.stack.push(node);
    state.on_stack.insert(node);

    let graph: &'a Graph = state.graph;
    let targets: Vec<&'a str> = graph.outgoing(node).iter().map(|(_, t)| t.as_str()).collect();
    for target in targets {
      if !state.indices.contains_key(target) {
        connect(target, state);
        let low = state.lowlinks[target].min(state.lowlinks[node]);
        state.lowlinks.insert(node, low);
      } else if state.on_stack.contains(target) {
        let low = state.indices[target].min(state.lowlinks[node]);
        state.lowlinks.insert(node, low);
      }
    }

    if state.lowlinks[node] == state.indices[node] {
      let mut component = Vec::new();
      while let Some(top) = state.stack.pop() {
        state.on_stack.remove(top);
        component.push(top.to_string());
        if top == node {
          break;
        }
      }
      state.components.push(component);
    }
  }

  let mut state = State {
    graph,
    index: 0,
    indices: HashMap::new(),
    lowlinks: HashMap::new(),
    stack: Vec::new(),
    on_stack: HashSet::new(),
    components: Vec::new(),
  };

  for node in &def.nodes {
    if !state.indices.contains_key(node.id.as_str()) {
      connect(&node.id, &mut state);
    }
  }

  state.components
}
