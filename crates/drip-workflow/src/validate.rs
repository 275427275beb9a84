use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use drip_config::{FlowDef, NodeData, NodeDef, NodeType};
use regex::Regex;

use crate::error::GraphError;
use crate::graph::Graph;
use crate::node::{EmailPayload, Node, NodeKind};

/// Same shape check the editor applies before letting a node be added.
static EMAIL_PATTERN: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

/// A flow graph that passed validation.
///
/// Immutable once built; the schedule compiler only ever reads it.
#[derive(Debug, Clone)]
pub struct ValidatedGraph {
  nodes: Vec<Node>,
  index: HashMap<String, usize>,
  graph: Graph,
}

impl ValidatedGraph {
  /// Nodes in document order.
  pub fn nodes(&self) -> &[Node] {
    &self.nodes
  }

  pub fn get_node(&self, node_id: &str) -> Option<&Node> {
    self.index.get(node_id).map(|&i| &self.nodes[i])
  }

  pub fn graph(&self) -> &Graph {
    &self.graph
  }
}

/// Validate a flow document.
///
/// Checks run in a fixed order and the first failure wins: non-empty
/// document, unique node ids, edges referencing known nodes, no self-loops,
/// no cycles, then per-node payloads.
pub fn validate(def: &FlowDef) -> Result<ValidatedGraph, GraphError> {
  if def.nodes.is_empty() || def.edges.is_empty() {
    return Err(GraphError::EmptyGraph);
  }

  let mut node_ids = HashSet::new();
  for node in &def.nodes {
    if !node_ids.insert(node.id.as_str()) {
      return Err(GraphError::DuplicateNode {
        node_id: node.id.clone(),
      });
    }
  }

  let edges: Vec<(String, String)> = def
    .edges
    .iter()
    .map(|e| (e.source.clone(), e.target.clone()))
    .collect();

  validate_edges(&node_ids, &edges)?;

  for (from, to) in &edges {
    if from == to {
      return Err(GraphError::SelfLoop {
        node_id: from.clone(),
      });
    }
  }

  let order: Vec<&str> = def.nodes.iter().map(|n| n.id.as_str()).collect();
  detect_cycle(&order, &edges)?;

  let nodes = def
    .nodes
    .iter()
    .map(validate_node)
    .collect::<Result<Vec<_>, _>>()?;

  let index = nodes
    .iter()
    .enumerate()
    .map(|(i, n)| (n.node_id.clone(), i))
    .collect();
  let graph = Graph::new(order, &edges);

  Ok(ValidatedGraph {
    nodes,
    index,
    graph,
  })
}

fn validate_edges(node_ids: &HashSet<&str>, edges: &[(String, String)]) -> Result<(), GraphError> {
  for (from, to) in edges {
    for endpoint in [from, to] {
      if !node_ids.contains(endpoint.as_str()) {
        return Err(GraphError::DanglingEdge {
          source_id: from.clone(),
          target_id: to.clone(),
          node_id: endpoint.clone(),
        });
      }
    }
  }
  Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
  White,
  Gray,
  Black,
}

/// DFS coloring over nodes in document order. Reports the node closing the
/// first back edge found.
fn detect_cycle(order: &[&str], edges: &[(String, String)]) -> Result<(), GraphError> {
  let mut adjacency: HashMap<&str, Vec<&str>> = order.iter().map(|&id| (id, Vec::new())).collect();
  for (from, to) in edges {
    if let Some(neighbors) = adjacency.get_mut(from.as_str()) {
      neighbors.push(to.as_str());
    }
  }

  let mut color: HashMap<&str, Color> = order.iter().map(|&id| (id, Color::White)).collect();

  // Iterative so that long delay chains can't overflow the stack.
  for &start in order {
    if color.get(start) != Some(&Color::White) {
      continue;
    }

    let mut stack: Vec<(&str, usize)> = vec![(start, 0)];
    color.insert(start, Color::Gray);

    while let Some((node, next)) = stack.last_mut() {
      let neighbors = adjacency.get(*node).map(|v| v.as_slice()).unwrap_or(&[]);
      if let Some(&neighbor) = neighbors.get(*next) {
        *next += 1;
        match color.get(neighbor) {
          Some(Color::Gray) => {
            return Err(GraphError::Cycle {
              node_id: neighbor.to_string(),
            });
          }
          Some(Color::White) => {
            color.insert(neighbor, Color::Gray);
            stack.push((neighbor, 0));
          }
          _ => {}
        }
      } else {
        color.insert(*node, Color::Black);
        stack.pop();
      }
    }
  }

  Ok(())
}

fn validate_node(def: &NodeDef) -> Result<Node, GraphError> {
  let kind = match def.node_type {
    NodeType::Email => NodeKind::Email(email_payload(&def.id, &def.data)?),
    NodeType::Delay => NodeKind::Delay {
      minutes: delay_minutes(&def.id, &def.data)?,
    },
  };

  Ok(Node {
    node_id: def.id.clone(),
    kind,
  })
}

fn email_payload(node_id: &str, data: &NodeData) -> Result<EmailPayload, GraphError> {
  let to = required(node_id, "to", data.to.as_deref())?;
  let subject = required(node_id, "subject", data.subject.as_deref())?;
  let message = required(node_id, "message", data.message.as_deref())?;

  if !EMAIL_PATTERN.is_match(&to) {
    return Err(GraphError::InvalidPayload {
      node_id: node_id.to_string(),
      message: format!("'{}' is not a valid email address", to),
    });
  }

  Ok(EmailPayload {
    to,
    subject,
    message,
  })
}

fn required(node_id: &str, field: &str, value: Option<&str>) -> Result<String, GraphError> {
  match value.map(str::trim) {
    Some(v) if !v.is_empty() => Ok(v.to_string()),
    _ => Err(GraphError::InvalidPayload {
      node_id: node_id.to_string(),
      message: format!("'{}' is required", field),
    }),
  }
}

fn delay_minutes(node_id: &str, data: &NodeData) -> Result<f64, GraphError> {
  let invalid = |message: String| GraphError::InvalidPayload {
    node_id: node_id.to_string(),
    message,
  };

  let minutes = match &data.delay {
    Some(serde_json::Value::Number(n)) => n.as_f64(),
    Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
    _ => return Err(invalid("'delay' is required".to_string())),
  };

  match minutes {
    Some(m) if m.is_finite() && m >= 0.0 => Ok(m),
    _ => Err(invalid(
      "'delay' must be a non-negative number of minutes".to_string(),
    )),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use drip_config::Edge;
  use serde_json::json;

  fn flow(nodes: Vec<NodeDef>, edges: &[(&str, &str)]) -> FlowDef {
    FlowDef {
      nodes,
      edges: edges.iter().map(|(s, t)| Edge::new(*s, *t)).collect(),
    }
  }

  fn email(id: &str) -> NodeDef {
    NodeDef::email(id, "a@x.com", "Hello", "Body")
  }

  #[test]
  fn test_validate_simple_chain() {
    let def = flow(
      vec![NodeDef::delay("d", 10.0), email("e")],
      &[("d", "e")],
    );

    let graph = validate(&def).unwrap();

    assert_eq!(graph.nodes().len(), 2);
    assert_eq!(graph.graph().entry_points(), &["d"]);
    assert_eq!(
      graph.get_node("d").unwrap().kind,
      NodeKind::Delay { minutes: 10.0 }
    );
  }

  #[test]
  fn test_empty_graph() {
    assert_eq!(validate(&FlowDef::default()).unwrap_err(), GraphError::EmptyGraph);
    assert_eq!(
      validate(&flow(vec![email("a"), email("b")], &[])).unwrap_err(),
      GraphError::EmptyGraph
    );
  }

  #[test]
  fn test_duplicate_node() {
    let def = flow(vec![email("a"), email("a")], &[("a", "a")]);
    assert_eq!(
      validate(&def).unwrap_err(),
      GraphError::DuplicateNode {
        node_id: "a".to_string()
      }
    );
  }

  #[test]
  fn test_dangling_edge() {
    let def = flow(vec![email("a")], &[("a", "ghost")]);
    assert_eq!(
      validate(&def).unwrap_err(),
      GraphError::DanglingEdge {
        source_id: "a".to_string(),
        target_id: "ghost".to_string(),
        node_id: "ghost".to_string(),
      }
    );
  }

  #[test]
  fn test_self_loop() {
    let def = flow(vec![email("a"), email("b")], &[("a", "b"), ("b", "b")]);
    assert_eq!(
      validate(&def).unwrap_err(),
      GraphError::SelfLoop {
        node_id: "b".to_string()
      }
    );
  }

  #[test]
  fn test_cycle_reported_even_with_bad_payloads() {
    let mut bad = email("c");
    bad.data.to = Some("not-an-address".to_string());
    let def = flow(
      vec![email("a"), NodeDef::delay("b", 1.0), bad],
      &[("a", "b"), ("b", "c"), ("c", "a")],
    );

    let err = validate(&def).unwrap_err();
    assert_eq!(err.kind(), "Cycle");
    assert_eq!(
      err,
      GraphError::Cycle {
        node_id: "a".to_string()
      }
    );
  }

  #[test]
  fn test_cycle_not_reachable_from_first_node() {
    let def = flow(
      vec![email("root"), email("x"), email("y"), email("z")],
      &[("root", "x"), ("y", "z"), ("z", "y")],
    );
    assert!(matches!(validate(&def), Err(GraphError::Cycle { .. })));
  }

  #[test]
  fn test_diamond_is_not_a_cycle() {
    let def = flow(
      vec![email("a"), email("b"), email("c"), email("d")],
      &[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")],
    );
    assert!(validate(&def).is_ok());
  }

  #[test]
  fn test_email_requires_all_fields() {
    let mut node = email("e");
    node.data.subject = Some("   ".to_string());
    let def = flow(vec![node, email("f")], &[("e", "f")]);

    match validate(&def) {
      Err(GraphError::InvalidPayload { node_id, message }) => {
        assert_eq!(node_id, "e");
        assert!(message.contains("subject"));
      }
      other => panic!("expected invalid payload, got {:?}", other),
    }
  }

  #[test]
  fn test_email_address_shape() {
    for bad in ["plain", "a@b", "a b@x.com", "@x.com", "a@@x.com"] {
      let def = flow(
        vec![NodeDef::email("e", bad, "s", "m"), email("f")],
        &[("e", "f")],
      );
      assert!(
        matches!(validate(&def), Err(GraphError::InvalidPayload { .. })),
        "{} should be rejected",
        bad
      );
    }
  }

  #[test]
  fn test_delay_accepts_numeric_strings() {
    let mut node = NodeDef::delay("d", 0.0);
    node.data.delay = Some(json!(" 2.5 "));
    let def = flow(vec![node, email("e")], &[("d", "e")]);

    let graph = validate(&def).unwrap();
    let delay = graph.get_node("d").unwrap();
    assert_eq!(delay.kind, NodeKind::Delay { minutes: 2.5 });
    assert_eq!(delay.delay_ms(), 150_000);
  }

  #[test]
  fn test_delay_rejects_bad_values() {
    for value in [json!(-1), json!(""), json!("soon"), json!(null), json!([5])] {
      let mut node = NodeDef::delay("d", 0.0);
      node.data.delay = Some(value.clone());
      let def = flow(vec![node, email("e")], &[("d", "e")]);
      assert!(
        matches!(validate(&def), Err(GraphError::InvalidPayload { .. })),
        "{} should be rejected",
        value
      );
    }

    let mut missing = NodeDef::delay("d", 0.0);
    missing.data.delay = None;
    let def = flow(vec![missing, email("e")], &[("d", "e")]);
    assert!(matches!(
      validate(&def),
      Err(GraphError::InvalidPayload { .. })
    ));
  }
}
