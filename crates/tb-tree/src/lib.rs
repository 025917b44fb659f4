//! # tb-tree
//!
//! The tree-node contract Tickbridge adapters plug into.
//!
//! The tree engine itself (parsing, control nodes, scheduling) lives
//! elsewhere. This crate only defines what a leaf looks like to it:
//!
//! - [`TreeNode`] — `tick` / `halt` / `status`
//! - [`NodeStatus`] — Idle, Running, Success, Failure
//! - [`PortsList`] — declared input/output slots of a node type
//! - [`Blackboard`] / [`NodeConfig`] / [`NodePorts`] — typed port access
//! - [`NodeRegistry`] — builders and manifests keyed by registration id

pub mod blackboard;
pub mod error;
pub mod node;
pub mod ports;
pub mod registry;
pub mod status;

pub use blackboard::{Blackboard, NodeConfig, NodePorts};
pub use error::NodeError;
pub use node::TreeNode;
pub use ports::{PortDirection, PortInfo, PortsList};
pub use registry::{NodeBuilder, NodeKind, NodeManifest, NodeRegistry};
pub use status::NodeStatus;
