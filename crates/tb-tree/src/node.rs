// node.rs — The contract between the executor and a leaf node.

use crate::error::NodeError;
use crate::status::NodeStatus;

/// A leaf node the executor ticks repeatedly.
///
/// `tick` must return promptly: long-running work is expected to report
/// `Running` and make progress across ticks. `halt` abandons whatever the
/// node is doing and returns it to `Idle`.
pub trait TreeNode: Send {
    /// Instance name (as written in the tree description).
    fn name(&self) -> &str;

    /// Status reported by the most recent tick, or `Idle`.
    fn status(&self) -> NodeStatus;

    /// Advance the node by one step.
    fn tick(&mut self) -> Result<NodeStatus, NodeError>;

    /// Abandon the current execution.
    fn halt(&mut self);
}
