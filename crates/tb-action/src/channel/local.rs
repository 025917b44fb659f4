// channel/local.rs — In-process action server.
//
// LocalActionServer runs each accepted goal on its own worker thread and
// delivers acceptance, feedback, and the result from that thread, which is
// exactly the situation the adapters are built for: notifications arrive
// outside the executor's tick loop.
//
// The work itself is a GoalExecutor. It publishes feedback through its
// GoalContext and is expected to check `is_cancel_requested` between steps.
//
// A submission is tracked only while its goal is undecided or running. It is
// forgotten just before the final callback (rejection or result) fires, so
// `poll_acceptance` on a finished ticket reports Pending.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use crate::action::{ActionType, GoalResult};
use crate::channel::{
    AcceptanceStatus, ActionChannel, CancelAck, ChannelError, ChannelResolver, GoalCallbacks,
    GoalHandle, SubmissionTicket,
};

const WAIT_STEP: Duration = Duration::from_millis(5);

/// The work performed for each goal a LocalActionServer accepts.
pub trait GoalExecutor<A: ActionType>: Send + Sync + 'static {
    /// Decide whether to accept a goal. Accepts everything by default.
    fn accept(&self, _goal: &A::Goal) -> bool {
        true
    }

    /// Run an accepted goal to completion on the worker thread.
    fn execute(&self, goal: A::Goal, ctx: &GoalContext<A>) -> GoalResult<A::Result>;
}

/// Handle given to a running GoalExecutor.
pub struct GoalContext<A: ActionType> {
    handle: GoalHandle,
    cancel: Arc<AtomicBool>,
    feedback: Mutex<Box<dyn FnMut(A::Feedback) + Send>>,
}

impl<A: ActionType> GoalContext<A> {
    pub fn handle(&self) -> GoalHandle {
        self.handle
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Send one feedback message to the client.
    pub fn publish_feedback(&self, feedback: A::Feedback) {
        let mut callback = self.feedback.lock().unwrap_or_else(|e| e.into_inner());
        (*callback)(feedback);
    }
}

#[derive(Default)]
struct ServerState {
    submissions: HashMap<SubmissionTicket, AcceptanceStatus>,
    active: HashMap<GoalHandle, Arc<AtomicBool>>,
}

/// Action endpoint living in the same process.
pub struct LocalActionServer<A: ActionType> {
    name: String,
    executor: Arc<dyn GoalExecutor<A>>,
    state: Arc<Mutex<ServerState>>,
    acceptance_delay: Duration,
    online: AtomicBool,
}

impl<A: ActionType> LocalActionServer<A> {
    pub fn new(name: impl Into<String>, executor: impl GoalExecutor<A>) -> Self {
        Self {
            name: name.into(),
            executor: Arc::new(executor),
            state: Arc::new(Mutex::new(ServerState::default())),
            acceptance_delay: Duration::ZERO,
            online: AtomicBool::new(true),
        }
    }

    /// Delay every acceptance decision, e.g. to exercise client timeouts.
    pub fn with_acceptance_delay(mut self, delay: Duration) -> Self {
        self.acceptance_delay = delay;
        self
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Goals accepted and not yet finished.
    pub fn active_goals(&self) -> usize {
        lock(&self.state).active.len()
    }

    /// Submissions still awaiting a decision or a result.
    pub fn tracked_submissions(&self) -> usize {
        lock(&self.state).submissions.len()
    }
}

fn lock(state: &Mutex<ServerState>) -> MutexGuard<'_, ServerState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

impl<A: ActionType> ActionChannel<A> for LocalActionServer<A> {
    fn name(&self) -> &str {
        &self.name
    }

    fn submit(
        &self,
        goal: A::Goal,
        callbacks: GoalCallbacks<A>,
    ) -> Result<SubmissionTicket, ChannelError> {
        if !self.is_online() {
            return Err(ChannelError::Closed);
        }

        let ticket = SubmissionTicket::new();
        lock(&self.state)
            .submissions
            .insert(ticket, AcceptanceStatus::Pending);

        let executor = Arc::clone(&self.executor);
        let state = Arc::clone(&self.state);
        let delay = self.acceptance_delay;

        thread::Builder::new()
            .name(format!("{}-goal", self.name))
            .spawn(move || {
                let GoalCallbacks {
                    on_acceptance,
                    on_feedback,
                    on_result,
                } = callbacks;

                if !delay.is_zero() {
                    thread::sleep(delay);
                }

                if !executor.accept(&goal) {
                    lock(&state).submissions.remove(&ticket);
                    on_acceptance(AcceptanceStatus::Rejected);
                    return;
                }

                let handle = GoalHandle::new();
                let cancel = Arc::new(AtomicBool::new(false));
                {
                    let mut state = lock(&state);
                    state
                        .submissions
                        .insert(ticket, AcceptanceStatus::Accepted(handle));
                    state.active.insert(handle, Arc::clone(&cancel));
                }
                on_acceptance(AcceptanceStatus::Accepted(handle));

                let ctx = GoalContext {
                    handle,
                    cancel,
                    feedback: Mutex::new(on_feedback),
                };
                let result = executor.execute(goal, &ctx);

                {
                    let mut state = lock(&state);
                    state.active.remove(&handle);
                    state.submissions.remove(&ticket);
                }
                on_result(result);
            })
            .map_err(|e| ChannelError::SubmissionRefused(e.to_string()))?;

        Ok(ticket)
    }

    fn poll_acceptance(&self, ticket: &SubmissionTicket) -> AcceptanceStatus {
        lock(&self.state)
            .submissions
            .get(ticket)
            .copied()
            .unwrap_or(AcceptanceStatus::Pending)
    }

    /// Flags the goal and waits until its executor returns.
    fn request_cancel(
        &self,
        goal: &GoalHandle,
        timeout: Duration,
    ) -> Result<CancelAck, ChannelError> {
        let flag = lock(&self.state)
            .active
            .get(goal)
            .cloned()
            .ok_or(ChannelError::UnknownGoal(*goal))?;
        flag.store(true, Ordering::SeqCst);

        let deadline = Instant::now() + timeout;
        loop {
            if !lock(&self.state).active.contains_key(goal) {
                return Ok(CancelAck::Acknowledged);
            }
            if Instant::now() >= deadline {
                return Ok(CancelAck::TimedOut);
            }
            thread::sleep(WAIT_STEP);
        }
    }
}

/// Resolves action names to in-process servers.
pub struct LocalResolver<A: ActionType> {
    servers: Mutex<HashMap<String, Arc<LocalActionServer<A>>>>,
}

impl<A: ActionType> LocalResolver<A> {
    pub fn new() -> Self {
        Self {
            servers: Mutex::new(HashMap::new()),
        }
    }

    /// Make `server` resolvable under its name.
    pub fn register(&self, server: Arc<LocalActionServer<A>>) {
        let mut servers = self.servers.lock().unwrap_or_else(|e| e.into_inner());
        servers.insert(server.name.clone(), server);
    }

    fn lookup(&self, action_name: &str) -> Option<Arc<LocalActionServer<A>>> {
        let servers = self.servers.lock().unwrap_or_else(|e| e.into_inner());
        servers
            .get(action_name)
            .filter(|server| server.is_online())
            .cloned()
    }
}

impl<A: ActionType> Default for LocalResolver<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: ActionType> ChannelResolver<A> for LocalResolver<A> {
    /// Waits up to `timeout` for a server with that name to come online.
    fn resolve(
        &self,
        action_name: &str,
        timeout: Duration,
    ) -> Result<Arc<dyn ActionChannel<A>>, ChannelError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(server) = self.lookup(action_name) {
                let channel: Arc<dyn ActionChannel<A>> = server;
                return Ok(channel);
            }
            if Instant::now() >= deadline {
                return Err(ChannelError::Unreachable {
                    action_name: action_name.to_string(),
                });
            }
            thread::sleep(WAIT_STEP);
        }
    }
}
