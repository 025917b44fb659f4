//! # tb-action
//!
//! Tick adapters that drive asynchronous remote actions from a synchronous
//! tree executor.
//!
//! An [`ActionNode`] submits one goal per invocation, reports `Running`
//! while the endpoint works, and settles on exactly one `Success` or
//! `Failure`. Acceptance, feedback, and the result arrive through channel
//! callbacks at any time; ticks never block on them.
//!
//! ## Key components
//!
//! - [`RemoteAction`] — hooks a concrete action implements (goal, feedback,
//!   result, failure)
//! - [`ActionNode`] — the poll/halt state machine (Idle → AwaitingAcceptance
//!   → AwaitingResult → Succeeded | Failed)
//! - [`EvaluatorNode`] / [`ActionEvaluator`] — derive costs from feedback
//! - [`ActionChannel`] / [`ChannelResolver`] — the transport contract
//! - [`LocalActionServer`] / [`ManualChannel`] — in-process channels
//! - [`GoalSession`] — state of one in-flight goal
//! - [`AdapterEvent`] / [`EventDispatcher`] — lifecycle events and sinks
//! - [`register_action`] / [`register_evaluator`] — registry glue

pub mod action;
pub mod action_node;
pub mod channel;
pub mod clock;
pub mod error;
pub mod evaluator;
pub mod events;
pub mod params;
pub mod register;
pub mod session;

pub use action::{ActionType, GoalResult, ResultCode};
pub use action_node::{ActionNode, ActionNodeSetup, ActionState, RemoteAction};
pub use channel::{
    AcceptanceStatus, ActionChannel, CancelAck, ChannelBinding, ChannelError, ChannelResolver,
    GoalCallbacks, GoalContext, GoalExecutor, GoalHandle, LocalActionServer, LocalResolver,
    ManualChannel, SubmissionTicket,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ActionNodeError, ConfigError, EventError, SessionError};
pub use evaluator::{ActionEvaluator, DerivedCosts, Evaluation, EvaluatorNode};
pub use events::{AdapterEvent, EventDispatcher, EventSink, JsonlSink, MemorySink};
pub use params::ActionNodeParams;
pub use register::{
    action_base_ports, evaluator_base_ports, register_action, register_evaluator,
};
pub use session::{AcceptanceState, FeedbackDirective, GoalSession, SessionCell};
