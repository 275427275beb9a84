use serde::{Deserialize, Serialize};

/// The content of one email, as handed to the mail transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailPayload {
  pub to: String,
  pub subject: String,
  pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
  Email(EmailPayload),
  Delay { minutes: f64 },
}

/// A validated node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
  pub node_id: String,
  pub kind: NodeKind,
}

impl Node {
  /// How far this node pushes its downstream nodes, in milliseconds.
  pub fn delay_ms(&self) -> i64 {
    match &self.kind {
      NodeKind::Email(_) => 0,
      NodeKind::Delay { minutes } => (minutes * 60_000.0).round() as i64,
    }
  }
}
