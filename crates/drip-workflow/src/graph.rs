use std::collections::HashMap;

/// Adjacency structure for traversal.
///
/// Downstream lists keep the order in which edges appear in the document so
/// that traversals are deterministic.
#[derive(Debug, Clone)]
pub struct Graph {
  /// Adjacency list: node_id -> list of downstream node_ids.
  adjacency: HashMap<String, Vec<String>>,
  /// Nodes with no incoming edges, sorted by id.
  entry_points: Vec<String>,
}

impl Graph {
  /// Build a graph from node ids and `(source, target)` edges.
  pub fn new<'a>(node_ids: impl IntoIterator<Item = &'a str>, edges: &[(String, String)]) -> Self {
    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
    let mut in_degree: HashMap<String, usize> = HashMap::new();

    for node_id in node_ids {
      adjacency.entry(node_id.to_string()).or_default();
      in_degree.entry(node_id.to_string()).or_default();
    }

    for (from, to) in edges {
      adjacency.entry(from.clone()).or_default().push(to.clone());
      *in_degree.entry(to.clone()).or_default() += 1;
    }

    let mut entry_points: Vec<String> = in_degree
      .into_iter()
      .filter(|(_, degree)| *degree == 0)
      .map(|(id, _)| id)
      .collect();
    entry_points.sort();

    Self {
      adjacency,
      entry_points,
    }
  }

  /// Nodes with no incoming edges, in lexicographic id order.
  pub fn entry_points(&self) -> &[String] {
    &self.entry_points
  }

  /// Downstream nodes for a given node, in document edge order.
  pub fn downstream(&self, node_id: &str) -> &[String] {
    self
      .adjacency
      .get(node_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }
}
