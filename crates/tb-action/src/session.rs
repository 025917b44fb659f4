// session.rs — GoalSession: the state of one in-flight goal.
//
// A session is created when an adapter submits a goal and dropped when the
// adapter reports a terminal status or is halted. It is written from two
// sides:
//
//   - the executor thread (tick/halt) records submission and reads progress
//   - the channel's callbacks record acceptance, feedback, and the result
//
// Both go through a SessionCell, which holds at most one live session.
// Every callback carries the id of the session it was registered for;
// updates addressed to any other id are dropped, so notifications that
// arrive after a halt or timeout can never leak into the next session.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tb_tree::NodeStatus;
use uuid::Uuid;

use crate::action::{ActionType, GoalResult};
use crate::channel::{AcceptanceStatus, GoalHandle, SubmissionTicket};
use crate::error::SessionError;

/// Whether the endpoint has accepted the session's goal.
///
/// Leaves `Pending` exactly once and never returns to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptanceState {
    Pending,
    Accepted(GoalHandle),
    Rejected,
}

impl AcceptanceState {
    pub fn can_transition_to(&self, next: &AcceptanceState) -> bool {
        matches!(
            (self, next),
            (AcceptanceState::Pending, AcceptanceState::Accepted(_))
                | (AcceptanceState::Pending, AcceptanceState::Rejected)
        )
    }
}

impl From<AcceptanceStatus> for AcceptanceState {
    fn from(status: AcceptanceStatus) -> Self {
        match status {
            AcceptanceStatus::Pending => AcceptanceState::Pending,
            AcceptanceStatus::Accepted(handle) => AcceptanceState::Accepted(handle),
            AcceptanceStatus::Rejected => AcceptanceState::Rejected,
        }
    }
}

impl fmt::Display for AcceptanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcceptanceState::Pending => write!(f, "pending"),
            AcceptanceState::Accepted(_) => write!(f, "accepted"),
            AcceptanceState::Rejected => write!(f, "rejected"),
        }
    }
}

/// What the latest feedback asked the adapter to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackDirective {
    Continue,
    /// Cancel the goal and report this status (Success or Failure).
    Stop(NodeStatus),
    /// The feedback hook returned a status it must never return.
    Violated(NodeStatus),
}

impl FeedbackDirective {
    /// Interpret the status returned by a feedback hook.
    pub fn from_hook(status: NodeStatus) -> Self {
        match status {
            NodeStatus::Running => FeedbackDirective::Continue,
            NodeStatus::Success | NodeStatus::Failure => FeedbackDirective::Stop(status),
            NodeStatus::Idle => FeedbackDirective::Violated(status),
        }
    }

    pub fn is_continue(&self) -> bool {
        matches!(self, FeedbackDirective::Continue)
    }
}

impl fmt::Display for FeedbackDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedbackDirective::Continue => write!(f, "continue"),
            FeedbackDirective::Stop(status) => write!(f, "stop({})", status),
            FeedbackDirective::Violated(status) => write!(f, "violated({})", status),
        }
    }
}

/// One goal from submission to terminal outcome.
pub struct GoalSession<A: ActionType> {
    session_id: Uuid,
    goal: A::Goal,
    timeout: Duration,
    ticket: Option<SubmissionTicket>,
    submission_time: Option<Instant>,
    submitted_at: Option<DateTime<Utc>>,
    acceptance: AcceptanceState,
    directive: FeedbackDirective,
    terminal_result: Option<GoalResult<A::Result>>,
    result_delivered: bool,
    cancel_requested: bool,
}

impl<A: ActionType> GoalSession<A> {
    /// A fresh session with a new id, not yet submitted.
    pub fn new(goal: A::Goal, timeout: Duration) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            goal,
            timeout,
            ticket: None,
            submission_time: None,
            submitted_at: None,
            acceptance: AcceptanceState::Pending,
            directive: FeedbackDirective::Continue,
            terminal_result: None,
            result_delivered: false,
            cancel_requested: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.session_id
    }

    pub fn goal(&self) -> &A::Goal {
        &self.goal
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Record the moment the goal is handed to the channel.
    pub fn mark_submitting(&mut self, now: Instant) {
        self.submission_time = Some(now);
        self.submitted_at = Some(Utc::now());
    }

    pub fn set_ticket(&mut self, ticket: SubmissionTicket) {
        self.ticket = Some(ticket);
    }

    pub fn ticket(&self) -> Option<SubmissionTicket> {
        self.ticket
    }

    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }

    /// Time since submission, measured against `now`.
    pub fn elapsed(&self, now: Instant) -> Duration {
        self.submission_time
            .map(|sent| now.saturating_duration_since(sent))
            .unwrap_or_default()
    }

    /// True once more than `timeout` has passed without an answer.
    pub fn acceptance_expired(&self, now: Instant) -> bool {
        self.acceptance == AcceptanceState::Pending && self.elapsed(now) > self.timeout
    }

    pub fn acceptance(&self) -> AcceptanceState {
        self.acceptance
    }

    /// Record the endpoint's answer. Repeating the same answer is a no-op;
    /// changing it is an error and leaves the first answer in place.
    pub fn resolve_acceptance(&mut self, status: AcceptanceStatus) -> Result<(), SessionError> {
        let next = AcceptanceState::from(status);
        if next == self.acceptance || next == AcceptanceState::Pending {
            return Ok(());
        }
        if !self.acceptance.can_transition_to(&next) {
            return Err(SessionError::InvalidTransition {
                session_id: self.session_id,
                from: self.acceptance.to_string(),
                to: next.to_string(),
            });
        }
        self.acceptance = next;
        Ok(())
    }

    pub fn goal_handle(&self) -> Option<GoalHandle> {
        match self.acceptance {
            AcceptanceState::Accepted(handle) => Some(handle),
            _ => None,
        }
    }

    /// Store the outcome of one feedback hook call. A stop request (or a
    /// contract violation) is kept even if later feedback says continue.
    pub fn record_feedback(&mut self, status: NodeStatus) -> FeedbackDirective {
        if self.directive.is_continue() {
            self.directive = FeedbackDirective::from_hook(status);
        }
        self.directive
    }

    pub fn directive(&self) -> FeedbackDirective {
        self.directive
    }

    /// Store the terminal result. Only the first one is kept.
    pub fn record_result(&mut self, result: GoalResult<A::Result>) -> Result<(), SessionError> {
        if self.result_delivered {
            return Err(SessionError::ResultAlreadyDelivered(self.session_id));
        }
        self.result_delivered = true;
        self.terminal_result = Some(result);
        Ok(())
    }

    pub fn has_result(&self) -> bool {
        self.terminal_result.is_some()
    }

    /// Hand the stored result to the adapter, which consumes it once.
    pub fn take_result(&mut self) -> Option<GoalResult<A::Result>> {
        self.terminal_result.take()
    }

    /// Returns the goal handle the first time cancellation is claimed for
    /// an accepted goal, `None` afterwards or when nothing was accepted.
    pub fn claim_cancel(&mut self) -> Option<GoalHandle> {
        if self.cancel_requested {
            return None;
        }
        let handle = self.goal_handle()?;
        self.cancel_requested = true;
        Some(handle)
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel_requested
    }
}

/// Shared slot holding the live session, if any.
pub struct SessionCell<A: ActionType> {
    inner: Arc<Mutex<Option<GoalSession<A>>>>,
}

impl<A: ActionType> Clone for SessionCell<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: ActionType> Default for SessionCell<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: ActionType> SessionCell<A> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(None)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<GoalSession<A>>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Install `session` as the live one and return its id.
    pub fn begin(&self, session: GoalSession<A>) -> Uuid {
        let id = session.id();
        let previous = self.lock().replace(session);
        if let Some(previous) = previous {
            tracing::debug!("session {} replaced by {}", previous.id(), id);
        }
        id
    }

    /// Drop the live session. Later callbacks addressed to it are ignored.
    pub fn end(&self) -> Option<GoalSession<A>> {
        self.lock().take()
    }

    pub fn live_id(&self) -> Option<Uuid> {
        self.lock().as_ref().map(GoalSession::id)
    }

    pub fn is_live(&self, session_id: Uuid) -> bool {
        self.live_id() == Some(session_id)
    }

    /// Run `f` on the session if `session_id` is still the live one.
    pub fn update<R>(
        &self,
        session_id: Uuid,
        f: impl FnOnce(&mut GoalSession<A>) -> R,
    ) -> Option<R> {
        let mut slot = self.lock();
        match slot.as_mut() {
            Some(session) if session.id() == session_id => Some(f(session)),
            _ => None,
        }
    }

    /// Run `f` on whichever session is live.
    pub fn with_live<R>(&self, f: impl FnOnce(&mut GoalSession<A>) -> R) -> Option<R> {
        self.lock().as_mut().map(f)
    }
}
