// channel/mod.rs — The action channel contract the adapters call into.
//
// An ActionChannel is whatever transport actually talks to the remote
// endpoint. The adapters only rely on this contract:
//
//   submit          → hands over a goal plus callbacks, returns a ticket
//   poll_acceptance → non-blocking "has the endpoint answered yet?"
//   request_cancel  → bounded wait for the endpoint to acknowledge
//
// Callbacks are invoked from the channel's own execution context. Channels
// must deliver acceptance before any feedback or result of the same goal,
// at most one result per accepted goal, and all feedback before the result.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::action::{ActionType, GoalResult};

pub mod local;
pub mod manual;

pub use local::{GoalContext, GoalExecutor, LocalActionServer, LocalResolver};
pub use manual::ManualChannel;

/// Errors from ActionChannel and ChannelResolver operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("action server [{action_name}] is not reachable")]
    Unreachable { action_name: String },

    #[error("goal submission refused: {0}")]
    SubmissionRefused(String),

    #[error("unknown goal: {0}")]
    UnknownGoal(GoalHandle),

    #[error("channel closed")]
    Closed,
}

/// Channel-owned reference to an accepted goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GoalHandle(pub Uuid);

impl GoalHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GoalHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GoalHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "goal:{}", self.0)
    }
}

/// Receipt for a submitted goal, used to ask whether it was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubmissionTicket(pub Uuid);

impl SubmissionTicket {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubmissionTicket {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubmissionTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ticket:{}", self.0)
    }
}

/// Whether the endpoint has answered a submission yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptanceStatus {
    Pending,
    Accepted(GoalHandle),
    Rejected,
}

/// Outcome of a bounded cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelAck {
    Acknowledged,
    TimedOut,
}

/// Notifications a channel delivers for one submitted goal.
pub struct GoalCallbacks<A: ActionType> {
    /// Called once when the endpoint accepts or rejects the goal.
    pub on_acceptance: Box<dyn FnOnce(AcceptanceStatus) + Send>,
    /// Called for every feedback message, after acceptance.
    pub on_feedback: Box<dyn FnMut(A::Feedback) + Send>,
    /// Called once with the terminal result of an accepted goal.
    pub on_result: Box<dyn FnOnce(GoalResult<A::Result>) + Send>,
}

impl<A: ActionType> GoalCallbacks<A> {
    /// Callbacks that drop every notification.
    pub fn ignore() -> Self {
        Self {
            on_acceptance: Box::new(|_| {}),
            on_feedback: Box::new(|_| {}),
            on_result: Box::new(|_| {}),
        }
    }
}

/// Connection to one remote action endpoint.
pub trait ActionChannel<A: ActionType>: Send + Sync {
    /// Endpoint identifier (for logs and events).
    fn name(&self) -> &str;

    /// Hand a goal to the endpoint. Must not wait for acceptance.
    fn submit(
        &self,
        goal: A::Goal,
        callbacks: GoalCallbacks<A>,
    ) -> Result<SubmissionTicket, ChannelError>;

    /// Non-blocking check of a submission's acceptance.
    fn poll_acceptance(&self, ticket: &SubmissionTicket) -> AcceptanceStatus;

    /// Ask the endpoint to cancel an accepted goal, waiting at most `timeout`
    /// for it to acknowledge.
    fn request_cancel(&self, goal: &GoalHandle, timeout: Duration)
        -> Result<CancelAck, ChannelError>;
}

/// Creates channels on demand, waiting at most `timeout` for the endpoint.
pub trait ChannelResolver<A: ActionType>: Send + Sync {
    fn resolve(
        &self,
        action_name: &str,
        timeout: Duration,
    ) -> Result<Arc<dyn ActionChannel<A>>, ChannelError>;
}

/// How an adapter obtains its channel.
pub enum ChannelBinding<A: ActionType> {
    /// A channel supplied by the caller, who owns its lifetime.
    Shared(Arc<dyn ActionChannel<A>>),
    /// Resolved lazily on the first tick and cached afterwards.
    Resolve(Arc<dyn ChannelResolver<A>>),
}

impl<A: ActionType> Clone for ChannelBinding<A> {
    fn clone(&self) -> Self {
        match self {
            ChannelBinding::Shared(channel) => ChannelBinding::Shared(Arc::clone(channel)),
            ChannelBinding::Resolve(resolver) => ChannelBinding::Resolve(Arc::clone(resolver)),
        }
    }
}
