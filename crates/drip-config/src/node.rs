use serde::{Deserialize, Serialize};

/// A node as placed on the editor canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
  pub id: String,
  #[serde(rename = "type")]
  pub node_type: NodeType,
  #[serde(default)]
  pub data: NodeData,
  /// Canvas position. Cosmetic only.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub position: Option<Position>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
  /// Sends one email when reached.
  Email,
  /// Pushes everything downstream back by `data.delay` minutes.
  Delay,
}

/// Kind-specific node payload.
///
/// The editor sends every field for every node kind (empty strings for the
/// ones that don't apply), so all fields are optional here and checked
/// against the node kind during validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub label: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub to: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub subject: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
  /// Delay in minutes. Either a JSON number or a numeric string, since the
  /// editor stores the raw form value.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub delay: Option<serde_json::Value>,
}

impl NodeDef {
  /// Build an email node.
  pub fn email(id: &str, to: &str, subject: &str, message: &str) -> Self {
    Self {
      id: id.to_string(),
      node_type: NodeType::Email,
      data: NodeData {
        to: Some(to.to_string()),
        subject: Some(subject.to_string()),
        message: Some(message.to_string()),
        ..Default::default()
      },
      position: None,
    }
  }

  /// Build a delay node of `minutes` minutes.
  pub fn delay(id: &str, minutes: f64) -> Self {
    Self {
      id: id.to_string(),
      node_type: NodeType::Delay,
      data: NodeData {
        delay: Some(serde_json::json!(minutes)),
        ..Default::default()
      },
      position: None,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
  pub x: f64,
  pub y: f64,
}
