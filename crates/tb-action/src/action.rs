// action.rs — Message types of a remote action.
//
// A remote action is described by three message types: the goal sent to
// the endpoint, the feedback it streams while working, and the result it
// reports once. ActionType groups them so adapters, channels, and servers
// agree on the payloads at compile time.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Message types of one remote action.
///
/// Feedback is exchanged through node ports, so it must round-trip through
/// JSON.
pub trait ActionType: Send + Sync + 'static {
    type Goal: Clone + Send + fmt::Debug + 'static;
    type Feedback: Clone + Send + Sync + fmt::Debug + Serialize + DeserializeOwned + 'static;
    type Result: Clone + Send + Sync + fmt::Debug + 'static;
}

/// Terminal outcome reported by the endpoint for an accepted goal.
#[derive(Debug, Clone, PartialEq)]
pub enum GoalResult<R> {
    Succeeded(R),
    Aborted,
    Cancelled,
}

impl<R> GoalResult<R> {
    pub fn code(&self) -> ResultCode {
        match self {
            GoalResult::Succeeded(_) => ResultCode::Succeeded,
            GoalResult::Aborted => ResultCode::Aborted,
            GoalResult::Cancelled => ResultCode::Cancelled,
        }
    }
}

/// Payload-free view of a [`GoalResult`], used in events and logs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResultCode {
    Succeeded,
    Aborted,
    Cancelled,
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultCode::Succeeded => write!(f, "succeeded"),
            ResultCode::Aborted => write!(f, "aborted"),
            ResultCode::Cancelled => write!(f, "cancelled"),
        }
    }
}
