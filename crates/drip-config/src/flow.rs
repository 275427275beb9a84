use serde::{Deserialize, Serialize};

use crate::edge::Edge;
use crate::node::NodeDef;

/// A flow document as submitted for saving.
///
/// Missing `nodes`/`edges` deserialize as empty so that structural problems
/// are reported by validation rather than by the JSON parser.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowDef {
  #[serde(default)]
  pub nodes: Vec<NodeDef>,
  #[serde(default)]
  pub edges: Vec<Edge>,
}
