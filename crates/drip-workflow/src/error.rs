use thiserror::Error;

/// Reasons a flow document is rejected.
///
/// Every variant names the offending node so the editor can point at it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
  /// The document has no nodes or no edges.
  #[error("flow must contain at least one node and one edge")]
  EmptyGraph,

  /// Two nodes share an id.
  #[error("duplicate node id: {node_id}")]
  DuplicateNode { node_id: String },

  /// An edge references a node that does not exist.
  #[error("edge {source_id} -> {target_id} references unknown node '{node_id}'")]
  DanglingEdge {
    source_id: String,
    target_id: String,
    node_id: String,
  },

  /// An edge points from a node to itself.
  #[error("node '{node_id}' has an edge to itself")]
  SelfLoop { node_id: String },

  /// The graph contains a directed cycle through this node.
  #[error("cycle detected through node '{node_id}'")]
  Cycle { node_id: String },

  /// A node's kind-specific payload is missing or malformed.
  #[error("invalid payload on node '{node_id}': {message}")]
  InvalidPayload { node_id: String, message: String },
}

impl GraphError {
  /// Stable machine-readable name of the error class.
  pub fn kind(&self) -> &'static str {
    match self {
      GraphError::EmptyGraph => "EmptyGraph",
      GraphError::DuplicateNode { .. } => "DuplicateNode",
      GraphError::DanglingEdge { .. } => "DanglingEdge",
      GraphError::SelfLoop { .. } => "SelfLoop",
      GraphError::Cycle { .. } => "Cycle",
      GraphError::InvalidPayload { .. } => "InvalidPayload",
    }
  }

  /// The node the error is about, if any.
  pub fn node_id(&self) -> Option<&str> {
    match self {
      GraphError::EmptyGraph => None,
      GraphError::DuplicateNode { node_id }
      | GraphError::DanglingEdge { node_id, .. }
      | GraphError::SelfLoop { node_id }
      | GraphError::Cycle { node_id }
      | GraphError::InvalidPayload { node_id, .. } => Some(node_id),
    }
  }
}
