use std::collections::{HashMap, HashSet};

use trellis_definition::{Edge, NodeDef, Port};

/// Port-aware adjacency structure for traversal and analysis.
#[derive(Debug, Clone)]
pub struct Graph {
  /// node_id -> outgoing (port, target) pairs, in edge order.
  successors: HashMap<String, Vec<(Option<Port>, String)>>,
  /// node_id -> upstream node_ids.
  predecessors: HashMap<String, Vec<String>>,
}

impl Graph {
  /// Build a graph from nodes and edges. Edges whose endpoints are unknown
  /// are skipped; the validator reports them separately.
  pub fn new(nodes: &[NodeDef], edges: &[Edge]) -> Self {
    let ids: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();

    let mut successors: HashMap<String, Vec<(Option<Port>, String)>> = HashMap::new();
    let mut predecessors: HashMap<String, Vec<String>> = HashMap::new();
    for node in nodes {
      successors.entry(node.id.clone()).or_default();
      predecessors.entry(node.id.clone()).or_default();
    }

    for edge in edges {
      if !ids.contains(edge.source.as_str()) || !ids.contains(edge.target.as_str()) {
        continue;
      }
      successors
        .entry(edge.source.clone())
        .or_default()
        .push((edge.source_port, edge.target.clone()));
      predecessors
        .entry(edge.target.clone())
        .or_default()
        .push(edge.source.clone());
    }

    Self {
      successors,
      predecessors,
    }
  }

  /// The single successor reached through the given port, if any.
  pub fn successor(&self, node_id: &str, port: Option<Port>) -> Option<&str> {
    self
      .successors
      .get(node_id)?
      .iter()
      .find(|(p, _)| *p == port)
      .map(|(_, target)| target.as_str())
  }

  /// All outgoing (port, target) pairs for a node.
  pub fn outgoing(&self, node_id: &str) -> &[(Option<Port>, String)] {
    self
      .successors
      .get(node_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Upstream node ids for a node.
  pub fn incoming(&self, node_id: &str) -> &[String] {
    self
      .predecessors
      .get(node_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Every node reachable from `start`, following all ports.
  pub fn reachable_from(&self, start: &str) -> HashSet<String> {
    let mut seen = HashSet::new();
    let mut stack = vec![start.to_string()];
    while let Some(id) = stack.pop() {
      if !seen.insert(id.clone()) {
        continue;
      }
      for (_, target) in self.outgoing(&id) {
        if !seen.contains(target) {
          stack.push(target.clone());
        }
      }
    }
    seen
  }
}
