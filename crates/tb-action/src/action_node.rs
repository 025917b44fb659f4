// action_node.rs — ActionNode: a tree leaf backed by a remote action.
//
// The executor ticks synchronously; the action endpoint answers on its own
// schedule. ActionNode bridges the two with a small state machine:
//
//   Idle → AwaitingAcceptance → AwaitingResult → Succeeded | Failed
//
// Each tick advances it by at most one step and never blocks, apart from
// endpoint resolution on the first tick and the bounded cancellation wait.
// Channel callbacks only record what happened in the live GoalSession; the
// tick is the only place an outcome is decided, so every session reports
// exactly one terminal status.
//
// Operational errors all go through `RemoteAction::on_failure`. Hooks that
// return a status outside their contract panic: that is a bug in the hook,
// not a runtime condition.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tb_tree::{NodeConfig, NodeError, NodePorts, NodeStatus, PortsList, TreeNode};

use crate::action::{ActionType, GoalResult};
use crate::channel::{
    AcceptanceStatus, ActionChannel, CancelAck, ChannelBinding, ChannelError, ChannelResolver,
    GoalCallbacks,
};
use crate::clock::{Clock, SystemClock};
use crate::error::ActionNodeError;
use crate::events::{AdapterEvent, EventDispatcher};
use crate::params::ActionNodeParams;
use crate::register::{action_base_ports, ACTION_NAME_PORT, FEEDBACK_PORT, TIMEOUT_PORT};
use crate::session::{AcceptanceState, FeedbackDirective, GoalSession, SessionCell};

/// The behavior of a concrete remote action, plugged into an [`ActionNode`].
///
/// Only `send_goal` is required. Hooks run on the executor thread, except
/// `on_feedback`, which runs on the channel's callback context.
pub trait RemoteAction: Send + Sync + 'static {
    type Action: ActionType;

    /// Ports of the concrete action, merged with the common action ports.
    fn provided_ports() -> PortsList
    where
        Self: Sized,
    {
        PortsList::new()
    }

    /// Build the goal for a new session. `None` declines the invocation.
    fn send_goal(&self, ports: &NodePorts) -> Option<<Self::Action as ActionType>::Goal>;

    /// Decide the outcome of a successful result. Must return Success or
    /// Failure.
    fn on_result(
        &self,
        result: &<Self::Action as ActionType>::Result,
        ports: &NodePorts,
    ) -> NodeStatus {
        if let Some(feedback) = self.result_to_feedback(result) {
            if let Err(e) = ports.set_output(FEEDBACK_PORT, &feedback) {
                tracing::warn!("{}: could not publish final feedback: {}", ports.node_name(), e);
            }
        }
        NodeStatus::Success
    }

    /// React to one feedback message. `Running` keeps waiting; `Success` or
    /// `Failure` cancels the goal and ends the session with that status.
    fn on_feedback(
        &self,
        feedback: &<Self::Action as ActionType>::Feedback,
        ports: &NodePorts,
    ) -> NodeStatus {
        if let Err(e) = ports.set_output(FEEDBACK_PORT, feedback) {
            tracing::warn!("{}: could not publish feedback: {}", ports.node_name(), e);
        }
        NodeStatus::Running
    }

    /// Feedback to publish when the result arrives, if any.
    fn result_to_feedback(
        &self,
        _result: &<Self::Action as ActionType>::Result,
    ) -> Option<<Self::Action as ActionType>::Feedback> {
        None
    }

    /// Map an operational error to Success or Failure.
    fn on_failure(&self, _error: ActionNodeError, _ports: &NodePorts) -> NodeStatus {
        NodeStatus::Failure
    }
}

/// Where an [`ActionNode`] is in its current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionState {
    Idle,
    AwaitingAcceptance,
    AwaitingResult,
    Succeeded,
    Failed,
}

impl ActionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ActionState::Succeeded | ActionState::Failed)
    }
}

impl fmt::Display for ActionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionState::Idle => write!(f, "idle"),
            ActionState::AwaitingAcceptance => write!(f, "awaiting_acceptance"),
            ActionState::AwaitingResult => write!(f, "awaiting_result"),
            ActionState::Succeeded => write!(f, "succeeded"),
            ActionState::Failed => write!(f, "failed"),
        }
    }
}

/// Everything an [`ActionNode`] needs besides its action and port bindings.
pub struct ActionNodeSetup<A: ActionType> {
    pub params: ActionNodeParams,
    pub binding: ChannelBinding<A>,
    pub events: Arc<EventDispatcher>,
    pub clock: Arc<dyn Clock>,
}

impl<A: ActionType> ActionNodeSetup<A> {
    pub fn new(params: ActionNodeParams, binding: ChannelBinding<A>) -> Self {
        Self {
            params,
            binding,
            events: Arc::new(EventDispatcher::new()),
            clock: Arc::new(SystemClock),
        }
    }

    /// Use a channel the caller already holds. Port overrides of
    /// `action_name` are ignored.
    pub fn shared(params: ActionNodeParams, channel: Arc<dyn ActionChannel<A>>) -> Self {
        Self::new(params, ChannelBinding::Shared(channel))
    }

    /// Resolve the channel on the first tick.
    pub fn resolving(params: ActionNodeParams, resolver: Arc<dyn ChannelResolver<A>>) -> Self {
        Self::new(params, ChannelBinding::Resolve(resolver))
    }

    pub fn with_events(mut self, events: Arc<EventDispatcher>) -> Self {
        self.events = events;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl<A: ActionType> Clone for ActionNodeSetup<A> {
    fn clone(&self) -> Self {
        Self {
            params: self.params.clone(),
            binding: self.binding.clone(),
            events: Arc::clone(&self.events),
            clock: Arc::clone(&self.clock),
        }
    }
}

/// Tree leaf that runs one remote goal per invocation.
pub struct ActionNode<T: RemoteAction> {
    name: String,
    action: Arc<T>,
    ports: NodePorts,
    setup: ActionNodeSetup<T::Action>,
    channel: Option<Arc<dyn ActionChannel<T::Action>>>,
    session: SessionCell<T::Action>,
    state: ActionState,
    status: NodeStatus,
}

impl<T: RemoteAction> ActionNode<T> {
    pub fn new(
        name: impl Into<String>,
        action: T,
        config: NodeConfig,
        setup: ActionNodeSetup<T::Action>,
    ) -> Self {
        let name = name.into();
        let ports = NodePorts::new(&name, Self::ports_list(), config);
        Self {
            name,
            action: Arc::new(action),
            ports,
            setup,
            channel: None,
            session: SessionCell::new(),
            state: ActionState::Idle,
            status: NodeStatus::Idle,
        }
    }

    /// The action's own ports plus `action_name`, `timeout` and `feedback`.
    pub fn ports_list() -> PortsList {
        T::provided_ports().merge(&action_base_ports())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ActionState {
        self.state
    }

    pub fn status(&self) -> NodeStatus {
        self.status
    }

    pub fn action(&self) -> &T {
        &self.action
    }

    pub fn ports(&self) -> &NodePorts {
        &self.ports
    }

    /// Advance the node by one step. Returns Running, Success or Failure.
    pub fn poll(&mut self) -> NodeStatus {
        let status = match self.state {
            ActionState::Idle | ActionState::Succeeded | ActionState::Failed => {
                self.start_session()
            }
            ActionState::AwaitingAcceptance => self.check_acceptance(),
            ActionState::AwaitingResult => self.check_result(),
        };
        self.status = status;
        status
    }

    /// Abandon the live session, cancelling its goal if it was accepted.
    /// Does nothing when no session is in flight.
    pub fn halt(&mut self) {
        match self.state {
            ActionState::AwaitingAcceptance => {
                self.refresh_acceptance();
                self.cancel_goal();
            }
            ActionState::AwaitingResult => self.cancel_goal(),
            ActionState::Idle | ActionState::Succeeded | ActionState::Failed => return,
        }
        if let Some(session) = self.session.end() {
            tracing::debug!("{}: halted session {}", self.name, session.id());
        }
        self.state = ActionState::Idle;
        self.status = NodeStatus::Idle;
    }

    /// Return to Idle from any state. In-flight sessions are halted;
    /// a finished node just forgets its outcome.
    pub fn reset(&mut self) {
        if self.state.is_terminal() {
            self.state = ActionState::Idle;
            self.status = NodeStatus::Idle;
        } else {
            self.halt();
        }
    }

    fn start_session(&mut self) -> NodeStatus {
        self.state = ActionState::Idle;
        let timeout = self.effective_timeout();

        let channel = match self.channel(timeout) {
            Ok(channel) => channel,
            Err(e) => {
                tracing::error!("{}: {}", self.name, e);
                return self.fail(ActionNodeError::EndpointUnreachable);
            }
        };

        let Some(goal) = self.action.send_goal(&self.ports) else {
            return self.fail(ActionNodeError::InvalidGoal);
        };

        let mut session = GoalSession::new(goal.clone(), timeout);
        session.mark_submitting(self.setup.clock.now());
        let session_id = self.session.begin(session);

        match channel.submit(goal, self.callbacks(session_id)) {
            Ok(ticket) => {
                self.session.update(session_id, |s| s.set_ticket(ticket));
            }
            Err(e) => {
                tracing::error!("{}: goal submission failed: {}", self.name, e);
                return self.fail(ActionNodeError::EndpointUnreachable);
            }
        }

        tracing::debug!(
            "{}: submitted goal to {} (session {}, timeout {}ms)",
            self.name,
            channel.name(),
            session_id,
            timeout.as_millis()
        );
        self.setup.events.dispatch(&AdapterEvent::goal_submitted(
            &self.name,
            channel.name(),
            session_id,
        ));
        self.state = ActionState::AwaitingAcceptance;
        NodeStatus::Running
    }

    fn check_acceptance(&mut self) -> NodeStatus {
        let now = self.setup.clock.now();
        let Some(session_id) = self.session.live_id() else {
            return self.start_session();
        };
        let acceptance = self.refresh_acceptance();

        match acceptance {
            AcceptanceState::Pending => {
                let expired = self
                    .session
                    .update(session_id, |s| s.acceptance_expired(now))
                    .unwrap_or(false);
                if expired {
                    self.fail(ActionNodeError::GoalAcceptanceTimeout)
                } else {
                    NodeStatus::Running
                }
            }
            AcceptanceState::Rejected => {
                self.setup
                    .events
                    .dispatch(&AdapterEvent::goal_rejected(&self.name, session_id));
                self.fail(ActionNodeError::GoalRejectedByServer)
            }
            AcceptanceState::Accepted(handle) => {
                tracing::info!("{}: goal accepted ({})", self.name, handle);
                self.setup
                    .events
                    .dispatch(&AdapterEvent::goal_accepted(&self.name, session_id));
                self.state = ActionState::AwaitingResult;
                self.check_result()
            }
        }
    }

    /// Acceptance as recorded by the callback, or else as reported by a
    /// non-blocking poll of the channel.
    fn refresh_acceptance(&self) -> AcceptanceState {
        let Some((session_id, ticket, recorded)) = self
            .session
            .with_live(|s| (s.id(), s.ticket(), s.acceptance()))
        else {
            return AcceptanceState::Pending;
        };
        if recorded != AcceptanceState::Pending {
            return recorded;
        }
        let (Some(ticket), Some(channel)) = (ticket, self.channel.as_ref()) else {
            return recorded;
        };

        let polled = channel.poll_acceptance(&ticket);
        if polled == AcceptanceStatus::Pending {
            return recorded;
        }
        self.session
            .update(session_id, |s| {
                if let Err(e) = s.resolve_acceptance(polled) {
                    tracing::warn!("{}: {}", self.name, e);
                }
                s.acceptance()
            })
            .unwrap_or(recorded)
    }

    fn check_result(&mut self) -> NodeStatus {
        let Some((session_id, directive)) = self.session.with_live(|s| (s.id(), s.directive()))
        else {
            return self.start_session();
        };

        match directive {
            FeedbackDirective::Continue => {}
            FeedbackDirective::Stop(outcome) => {
                tracing::info!("{}: feedback requested stop with {}", self.name, outcome);
                self.cancel_goal();
                let status = check_status(&self.name, "on_feedback", outcome);
                return self.finish(status);
            }
            FeedbackDirective::Violated(status) => {
                panic!(
                    "{}: on_feedback must return Running, Success or Failure, got {}",
                    self.name, status
                );
            }
        }

        let Some(result) = self.session.update(session_id, |s| s.take_result()).flatten() else {
            return NodeStatus::Running;
        };

        tracing::info!("{}: result received ({})", self.name, result.code());
        self.setup.events.dispatch(&AdapterEvent::result_received(
            &self.name,
            session_id,
            result.code(),
        ));

        match result {
            GoalResult::Aborted => self.fail(ActionNodeError::ActionAborted),
            GoalResult::Cancelled => self.fail(ActionNodeError::ActionCancelled),
            GoalResult::Succeeded(payload) => {
                let status = self.action.on_result(&payload, &self.ports);
                let status = check_status(&self.name, "on_result", status);
                self.finish(status)
            }
        }
    }

    /// Request cancellation of the live session's goal, at most once per
    /// session and only if it was accepted.
    fn cancel_goal(&mut self) {
        let Some((session_id, handle, timeout)) = self
            .session
            .with_live(|s| s.claim_cancel().map(|handle| (s.id(), handle, s.timeout())))
            .flatten()
        else {
            return;
        };
        let Some(channel) = self.channel.as_ref() else {
            return;
        };

        let ack = match channel.request_cancel(&handle, timeout) {
            Ok(CancelAck::Acknowledged) => {
                tracing::debug!("{}: cancellation of {} acknowledged", self.name, handle);
                Some(CancelAck::Acknowledged)
            }
            Ok(CancelAck::TimedOut) => {
                tracing::warn!(
                    "{}: cancellation of {} not acknowledged within {}ms",
                    self.name,
                    handle,
                    timeout.as_millis()
                );
                Some(CancelAck::TimedOut)
            }
            Err(e) => {
                tracing::warn!("{}: cancellation of {} failed: {}", self.name, handle, e);
                None
            }
        };
        self.setup
            .events
            .dispatch(&AdapterEvent::cancel_requested(&self.name, session_id, ack));
    }

    fn fail(&mut self, error: ActionNodeError) -> NodeStatus {
        match error {
            ActionNodeError::EndpointUnreachable => {
                tracing::error!("{}: {}", self.name, error)
            }
            _ => tracing::warn!("{}: {}", self.name, error),
        }
        self.setup.events.dispatch(&AdapterEvent::session_failed(
            &self.name,
            self.session.live_id(),
            error,
        ));

        let status = self.action.on_failure(error, &self.ports);
        let status = check_status(&self.name, "on_failure", status);
        self.finish(status)
    }

    fn finish(&mut self, status: NodeStatus) -> NodeStatus {
        let session_id = self.session.end().map(|s| s.id());
        self.state = if status == NodeStatus::Success {
            ActionState::Succeeded
        } else {
            ActionState::Failed
        };
        self.setup.events.dispatch(&AdapterEvent::session_finished(
            &self.name,
            session_id,
            status,
        ));
        status
    }

    /// The cached channel, or a freshly resolved one.
    fn channel(
        &mut self,
        timeout: Duration,
    ) -> Result<Arc<dyn ActionChannel<T::Action>>, ChannelError> {
        if let Some(channel) = &self.channel {
            return Ok(Arc::clone(channel));
        }
        let channel = match &self.setup.binding {
            ChannelBinding::Shared(channel) => Arc::clone(channel),
            ChannelBinding::Resolve(resolver) => {
                let action_name = self.effective_action_name();
                tracing::debug!("{}: resolving action server [{}]", self.name, action_name);
                resolver.resolve(&action_name, timeout)?
            }
        };
        self.channel = Some(Arc::clone(&channel));
        Ok(channel)
    }

    /// `action_name` port if bound to a non-empty value, else the configured
    /// name.
    fn effective_action_name(&self) -> String {
        match self.ports.try_get_input::<String>(ACTION_NAME_PORT) {
            Ok(Some(name)) if !name.is_empty() => name,
            Ok(_) => self.setup.params.action_name.clone(),
            Err(e) => {
                tracing::warn!("{}: ignoring [{}]: {}", self.name, ACTION_NAME_PORT, e);
                self.setup.params.action_name.clone()
            }
        }
    }

    /// `timeout` port (milliseconds) if non-zero, else the configured one.
    fn effective_timeout(&self) -> Duration {
        match self.ports.try_get_input::<u64>(TIMEOUT_PORT) {
            Ok(Some(ms)) if ms > 0 => Duration::from_millis(ms),
            Ok(_) => self.setup.params.server_timeout,
            Err(e) => {
                tracing::warn!("{}: ignoring [{}]: {}", self.name, TIMEOUT_PORT, e);
                self.setup.params.server_timeout
            }
        }
    }

    /// Callbacks that write into session `session_id` and nothing else.
    fn callbacks(&self, session_id: uuid::Uuid) -> GoalCallbacks<T::Action> {
        let node = self.name.clone();

        let cell = self.session.clone();
        let acceptance_node = node.clone();
        let on_acceptance = move |status: AcceptanceStatus| {
            let applied = cell.update(session_id, |s| s.resolve_acceptance(status));
            match applied {
                Some(Ok(())) => {}
                Some(Err(e)) => tracing::warn!("{}: {}", acceptance_node, e),
                None => tracing::debug!(
                    "{}: dropped acceptance for stale session {}",
                    acceptance_node,
                    session_id
                ),
            }
        };

        let cell = self.session.clone();
        let action = Arc::clone(&self.action);
        let ports = self.ports.clone();
        let events = Arc::clone(&self.setup.events);
        let feedback_node = node.clone();
        let on_feedback = move |feedback: <T::Action as ActionType>::Feedback| {
            let stale = || {
                tracing::debug!(
                    "{}: dropped feedback for stale session {}",
                    feedback_node,
                    session_id
                )
            };
            if !cell.is_live(session_id) {
                stale();
                return;
            }
            // Hook runs with the session lock released.
            let status = action.on_feedback(&feedback, &ports);
            if cell
                .update(session_id, |s| s.record_feedback(status))
                .is_none()
            {
                stale();
                return;
            }
            let value = serde_json::to_value(&feedback).unwrap_or(serde_json::Value::Null);
            events.dispatch(&AdapterEvent::feedback_received(
                &feedback_node,
                session_id,
                value,
            ));
        };

        let cell = self.session.clone();
        let result_node = node;
        let on_result = move |result: GoalResult<<T::Action as ActionType>::Result>| {
            match cell.update(session_id, |s| s.record_result(result)) {
                Some(Ok(())) => {}
                Some(Err(e)) => tracing::warn!("{}: {}", result_node, e),
                None => tracing::debug!(
                    "{}: dropped result for stale session {}",
                    result_node,
                    session_id
                ),
            }
        };

        GoalCallbacks {
            on_acceptance: Box::new(on_acceptance),
            on_feedback: Box::new(on_feedback),
            on_result: Box::new(on_result),
        }
    }
}

impl<T: RemoteAction> TreeNode for ActionNode<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> NodeStatus {
        self.status
    }

    fn tick(&mut self) -> Result<NodeStatus, NodeError> {
        Ok(self.poll())
    }

    fn halt(&mut self) {
        ActionNode::halt(self);
    }
}

/// Panics unless `status` is Success or Failure.
pub(crate) fn check_status(node: &str, hook: &str, status: NodeStatus) -> NodeStatus {
    if !status.is_completed() {
        panic!(
            "{}: {} must return either Success or Failure, got {}",
            node, hook, status
        );
    }
    status
}
