// error.rs — Error types for the action adapters.
//
// ActionNodeError is the operational taxonomy handed to the failure hook.
// Hook contract violations are not errors at all: they panic (see
// action_node::check_status).

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Operational failures of an adapter invocation.
///
/// Every variant except `MissingFeedbackInput` is routed through
/// `RemoteAction::on_failure`, which decides the status the executor sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionNodeError {
    /// The action endpoint could not be resolved within the timeout.
    #[error("action server is not reachable")]
    EndpointUnreachable,

    /// `send_goal` declined to build a goal.
    #[error("goal construction declined")]
    InvalidGoal,

    /// The endpoint did not accept or reject the goal in time.
    #[error("timed out waiting for goal acceptance")]
    GoalAcceptanceTimeout,

    /// The endpoint rejected the goal.
    #[error("goal was rejected by the server")]
    GoalRejectedByServer,

    /// The endpoint reported the goal as aborted.
    #[error("action aborted by the server")]
    ActionAborted,

    /// The endpoint reported the goal as cancelled.
    #[error("action was cancelled")]
    ActionCancelled,

    /// An evaluator was ticked without a feedback sample bound to its input.
    #[error("missing required input [feedback]")]
    MissingFeedbackInput,
}

/// Violations of the goal-session invariants.
#[derive(Debug, Error, PartialEq)]
pub enum SessionError {
    /// Acceptance may only move out of Pending, and only once.
    #[error("invalid acceptance transition from {from} to {to} for session {session_id}")]
    InvalidTransition {
        session_id: Uuid,
        from: String,
        to: String,
    },

    /// The channel delivered a second result for the same goal.
    #[error("result already delivered for session {0}")]
    ResultAlreadyDelivered(Uuid),
}

/// Errors from adapter event sinks. Never fatal to the adapter.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: String,
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Errors loading adapter parameters.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid adapter parameters: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_serialize_as_snake_case() {
        let json = serde_json::to_string(&ActionNodeError::GoalAcceptanceTimeout).unwrap();
        assert_eq!(json, "\"goal_acceptance_timeout\"");
        let restored: ActionNodeError = serde_json::from_str("\"action_aborted\"").unwrap();
        assert_eq!(restored, ActionNodeError::ActionAborted);
    }

    #[test]
    fn session_error_display() {
        let id = Uuid::nil();
        let err = SessionError::ResultAlreadyDelivered(id);
        assert_eq!(
            err.to_string(),
            format!("result already delivered for session {}", id)
        );
    }
}
