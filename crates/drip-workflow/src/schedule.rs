//! Schedule compilation.
//!
//! The walk starts from a single entry point: the node with the smallest id
//! among those without incoming edges. It is at offset zero. Other entry
//! points and everything only they reach are not scheduled.
//!
//! The graph is walked breadth-first; a delay node adds its minutes to the
//! offset carried to its downstream nodes, an email node fires at
//! `start + offset` and passes the offset through unchanged.
//!
//! A node is visited once. When several paths reach the same node (a
//! diamond), the path that reaches it first in BFS order decides its offset
//! and later arrivals are ignored, so an email is never scheduled twice.
//! Downstream nodes are followed in document edge order, which makes
//! "first" deterministic.

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::node::{EmailPayload, NodeKind};
use crate::validate::ValidatedGraph;

/// One email to send at an absolute time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledAction {
  pub node_id: String,
  /// Offset from the flow's start time, in milliseconds.
  pub offset_ms: i64,
  pub trigger_at: DateTime<Utc>,
  pub payload: EmailPayload,
}

/// Compute the trigger time of every email node reachable from the root.
/// Actions are returned in traversal order.
pub fn compile(graph: &ValidatedGraph, start: DateTime<Utc>) -> Vec<ScheduledAction> {
  let mut actions = Vec::new();
  let mut visited: HashSet<&str> = HashSet::new();
  let mut queue: VecDeque<(&str, i64)> = VecDeque::new();

  let entry_points = graph.graph().entry_points();
  if let Some((root, others)) = entry_points.split_first() {
    if !others.is_empty() {
      warn!(root = %root, skipped = ?others, "extra_entry_points_ignored");
    }
    visited.insert(root.as_str());
    queue.push_back((root.as_str(), 0));
  }

  while let Some((node_id, offset_ms)) = queue.pop_front() {
    let Some(node) = graph.get_node(node_id) else {
      continue;
    };

    if let NodeKind::Email(payload) = &node.kind {
      actions.push(ScheduledAction {
        node_id: node_id.to_string(),
        offset_ms,
        trigger_at: trigger_time(start, offset_ms),
        payload: payload.clone(),
      });
    }

    let downstream_offset = offset_ms.saturating_add(node.delay_ms());
    for next in graph.graph().downstream(node_id) {
      if visited.insert(next.as_str()) {
        queue.push_back((next.as_str(), downstream_offset));
      } else {
        debug!(node_id = %next, via = %node_id, offset_ms = downstream_offset, "later_path_ignored");
      }
    }
  }

  let unreachable: Vec<&str> = graph
    .nodes()
    .iter()
    .filter(|n| matches!(n.kind, NodeKind::Email(_)) && !visited.contains(n.node_id.as_str()))
    .map(|n| n.node_id.as_str())
    .collect();
  if !unreachable.is_empty() {
    warn!(node_ids = ?unreachable, "unreachable_emails_not_scheduled");
  }

  actions
}

fn trigger_time(start: DateTime<Utc>, offset_ms: i64) -> DateTime<Utc> {
  TimeDelta::try_milliseconds(offset_ms)
    .and_then(|offset| start.checked_add_signed(offset))
    .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::validate::validate;
  use chrono::TimeZone;
  use drip_config::{Edge, FlowDef, NodeDef};

  fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
  }

  fn compile_flow(nodes: Vec<NodeDef>, edges: &[(&str, &str)]) -> Vec<ScheduledAction> {
    let def = FlowDef {
      nodes,
      edges: edges.iter().map(|(s, t)| Edge::new(*s, *t)).collect(),
    };
    compile(&validate(&def).unwrap(), start())
  }

  fn email(id: &str, to: &str) -> NodeDef {
    NodeDef::email(id, to, "Subject", "Message")
  }

  fn minutes(m: i64) -> TimeDelta {
    TimeDelta::minutes(m)
  }

  #[test]
  fn test_delay_then_email() {
    let actions = compile_flow(
      vec![NodeDef::delay("wait", 10.0), email("mail", "a@x.com")],
      &[("wait", "mail")],
    );

    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].node_id, "mail");
    assert_eq!(actions[0].trigger_at, start() + minutes(10));
    assert_eq!(actions[0].payload.to, "a@x.com");
  }

  #[test]
  fn test_email_delay_email() {
    let actions = compile_flow(
      vec![
        email("first", "a@x.com"),
        NodeDef::delay("wait", 5.0),
        email("second", "b@x.com"),
      ],
      &[("first", "wait"), ("wait", "second")],
    );

    assert_eq!(actions.len(), 2);
    assert_eq!(actions[0].node_id, "first");
    assert_eq!(actions[0].trigger_at, start());
    assert_eq!(actions[1].node_id, "second");
    assert_eq!(actions[1].trigger_at, start() + minutes(5));
    assert_eq!(actions[1].offset_ms, 5 * 60_000);
  }

  #[test]
  fn test_delays_accumulate_along_a_chain() {
    let actions = compile_flow(
      vec![
        NodeDef::delay("d1", 1.0),
        NodeDef::delay("d2", 2.5),
        email("e1", "a@x.com"),
        NodeDef::delay("d3", 60.0),
        email("e2", "b@x.com"),
      ],
      &[("d1", "d2"), ("d2", "e1"), ("e1", "d3"), ("d3", "e2")],
    );

    let times: Vec<_> = actions.iter().map(|a| a.offset_ms).collect();
    assert_eq!(times, vec![210_000, 3_810_000]);
  }

  #[test]
  fn test_diamond_uses_first_visited_path() {
    // Three delay paths of 10, 5 and 20 minutes converge on one email.
    // The first edge out of the root decides: neither the min nor the max.
    let actions = compile_flow(
      vec![
        email("root", "root@x.com"),
        NodeDef::delay("ten", 10.0),
        NodeDef::delay("five", 5.0),
        NodeDef::delay("twenty", 20.0),
        email("joined", "j@x.com"),
      ],
      &[
        ("root", "ten"),
        ("root", "five"),
        ("root", "twenty"),
        ("five", "joined"),
        ("ten", "joined"),
        ("twenty", "joined"),
      ],
    );

    let joined: Vec<_> = actions.iter().filter(|a| a.node_id == "joined").collect();
    assert_eq!(joined.len(), 1);
    assert_eq!(joined[0].trigger_at, start() + minutes(10));
  }

  #[test]
  fn test_diamond_prefers_fewer_hops() {
    // `mail` is one hop from `a` directly and two hops via `b`. BFS reaches
    // it directly first even though the edge into `b` is listed earlier.
    let actions = compile_flow(
      vec![
        NodeDef::delay("a", 1.0),
        NodeDef::delay("b", 2.0),
        email("mail", "m@x.com"),
      ],
      &[("a", "b"), ("b", "mail"), ("a", "mail")],
    );

    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].trigger_at, start() + minutes(1));
  }

  #[test]
  fn test_disconnected_component_is_not_scheduled() {
    let actions = compile_flow(
      vec![
        email("a", "a@x.com"),
        NodeDef::delay("d", 5.0),
        email("b", "b@x.com"),
        email("stray", "stray@x.com"),
        email("z", "z@x.com"),
      ],
      &[("a", "d"), ("d", "b"), ("stray", "z")],
    );

    let ids: Vec<_> = actions.iter().map(|a| a.node_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
    assert_eq!(actions[1].trigger_at, start() + minutes(5));
  }

  #[test]
  fn test_smallest_entry_point_is_the_root() {
    let actions = compile_flow(
      vec![
        NodeDef::delay("z-wait", 15.0),
        email("z-mail", "z@x.com"),
        NodeDef::delay("m-wait", 2.0),
        email("m-mail", "m@x.com"),
      ],
      &[("z-wait", "z-mail"), ("m-wait", "m-mail")],
    );

    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].node_id, "m-mail");
    assert_eq!(actions[0].trigger_at, start() + minutes(2));
  }

  #[test]
  fn test_delay_nodes_produce_no_actions() {
    let actions = compile_flow(
      vec![NodeDef::delay("a", 1.0), NodeDef::delay("b", 1.0)],
      &[("a", "b")],
    );
    assert!(actions.is_empty());
  }

  #[test]
  fn test_fan_out_schedules_each_branch() {
    let actions = compile_flow(
      vec![
        NodeDef::delay("wait", 0.5),
        email("x", "x@x.com"),
        email("y", "y@x.com"),
      ],
      &[("wait", "x"), ("wait", "y")],
    );

    assert_eq!(actions.len(), 2);
    assert!(actions.iter().all(|a| a.offset_ms == 30_000));
  }
}
