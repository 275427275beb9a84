//! Drip Config
//!
//! This crate contains the serializable flow document types for drip. These
//! types mirror the JSON the graph editor posts when a flow is saved, before
//! it is validated and compiled into a schedule by `drip-workflow`.
//!
//! ```json
//! {
//!   "nodes": [
//!     { "id": "node-1", "type": "delay", "data": { "delay": 10 } },
//!     { "id": "node-2", "type": "email",
//!       "data": { "to": "a@x.com", "subject": "Hi", "message": "Hello" } }
//!   ],
//!   "edges": [{ "source": "node-1", "target": "node-2" }]
//! }
//! ```

mod edge;
mod flow;
mod node;

pub use edge::Edge;
pub use flow::FlowDef;
pub use node::{NodeData, NodeDef, NodeType, Position};
