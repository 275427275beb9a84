//! Drip Workflow
//!
//! This crate turns a submitted [`FlowDef`](drip_config::FlowDef) into
//! something the scheduler can run:
//!
//! - [`validate`] checks the document and produces an immutable
//!   [`ValidatedGraph`] (unique ids, no dangling edges, no self-loops, no
//!   cycles, complete node payloads)
//! - [`compile`] walks the validated graph breadth-first from its root (the
//!   lexicographically smallest entry point) and assigns every reachable
//!   email node an absolute trigger time
//!
//! Delay nodes never produce work of their own; they only shift the trigger
//! time of everything downstream of them.

mod error;
mod graph;
mod node;
mod schedule;
mod validate;

pub use error::GraphError;
pub use graph::Graph;
pub use node::{EmailPayload, Node, NodeKind};
pub use schedule::{ScheduledAction, compile};
pub use validate::{ValidatedGraph, validate};
