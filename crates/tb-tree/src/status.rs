// status.rs — NodeStatus: what a tick reports back to the executor.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Status of a tree node as seen by the executor.
///
/// `Idle` means "not started" (or reset after a halt). A tick only ever
/// reports `Running`, `Success`, or `Failure`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    #[default]
    Idle,
    Running,
    Success,
    Failure,
}

impl NodeStatus {
    /// `Success` or `Failure`.
    pub fn is_completed(&self) -> bool {
        matches!(self, NodeStatus::Success | NodeStatus::Failure)
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, NodeStatus::Idle)
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeStatus::Idle => write!(f, "idle"),
            NodeStatus::Running => write!(f, "running"),
            NodeStatus::Success => write!(f, "success"),
            NodeStatus::Failure => write!(f, "failure"),
        }
    }
}
