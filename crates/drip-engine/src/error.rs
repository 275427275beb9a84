//! Errors surfaced to the caller saving a flow.

use drip_workflow::GraphError;
use serde_json::json;

/// Errors from [`FlowService::save_flow`](crate::FlowService::save_flow).
#[derive(Debug, thiserror::Error)]
pub enum SaveError {
  /// The document is malformed. Caused by the client, not retried.
  #[error("invalid graph: {0}")]
  InvalidGraph(#[from] GraphError),

  /// Persisting the flow failed.
  #[error("internal error: {0}")]
  Internal(#[from] drip_store::Error),
}

impl SaveError {
  /// HTTP status for this error.
  pub fn status_code(&self) -> u16 {
    match self {
      SaveError::InvalidGraph(_) => 400,
      SaveError::Internal(_) => 500,
    }
  }

  /// Error class reported to the caller.
  pub fn kind(&self) -> &'static str {
    match self {
      SaveError::InvalidGraph(_) => "InvalidGraph",
      SaveError::Internal(_) => "InternalError",
    }
  }

  /// Response body for this error.
  ///
  /// Validation failures carry the error class and the offending node so
  /// the editor can highlight it. Internal failures carry no detail.
  pub fn body(&self) -> serde_json::Value {
    match self {
      SaveError::InvalidGraph(e) => json!({
        "error": self.kind(),
        "kind": e.kind(),
        "nodeId": e.node_id(),
        "message": e.to_string(),
      }),
      SaveError::Internal(_) => json!({
        "error": self.kind(),
      }),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_invalid_graph_maps_to_400() {
    let err = SaveError::from(GraphError::Cycle {
      node_id: "n2".to_string(),
    });

    assert_eq!(err.status_code(), 400);
    let body = err.body();
    assert_eq!(body["error"], "InvalidGraph");
    assert_eq!(body["kind"], "Cycle");
    assert_eq!(body["nodeId"], "n2");
  }

  #[test]
  fn test_empty_graph_has_no_node() {
    let err = SaveError::from(GraphError::EmptyGraph);
    assert_eq!(err.status_code(), 400);
    assert_eq!(err.body()["kind"], "EmptyGraph");
    assert!(err.body()["nodeId"].is_null());
  }

  #[test]
  fn test_store_failure_maps_to_500() {
    let err = SaveError::from(drip_store::Error::Corrupt("bad row".to_string()));
    assert_eq!(err.status_code(), 500);
    assert_eq!(err.body(), json!({ "error": "InternalError" }));
  }
}
