// channel/manual.rs — A channel driven explicitly by its owner.
//
// ManualChannel never talks to a real endpoint. Whoever holds it decides
// when a goal is accepted, when feedback arrives, and how it ends. The
// adapter tests use it to replay exact notification orders; integrations
// that already run their own event loop can use it as a bridge.
//
// Callbacks run on the thread calling accept/publish_feedback/finish, with
// the channel's lock released.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::action::{ActionType, GoalResult};
use crate::channel::{
    AcceptanceStatus, ActionChannel, CancelAck, ChannelError, GoalCallbacks, GoalHandle,
    SubmissionTicket,
};

type FeedbackFn<F> = Box<dyn FnMut(F) + Send>;

struct Submission<A: ActionType> {
    ticket: SubmissionTicket,
    goal: A::Goal,
    status: AcceptanceStatus,
    on_acceptance: Option<Box<dyn FnOnce(AcceptanceStatus) + Send>>,
    on_feedback: Option<FeedbackFn<A::Feedback>>,
    on_result: Option<Box<dyn FnOnce(GoalResult<A::Result>) + Send>>,
}

struct ManualState<A: ActionType> {
    submissions: Vec<Submission<A>>,
    cancel_requests: Vec<GoalHandle>,
    cancel_ack: CancelAck,
    refuse_submissions: bool,
}

/// Channel whose notifications are triggered by the caller.
pub struct ManualChannel<A: ActionType> {
    name: String,
    state: Mutex<ManualState<A>>,
}

impl<A: ActionType> ManualChannel<A> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(ManualState {
                submissions: Vec::new(),
                cancel_requests: Vec::new(),
                cancel_ack: CancelAck::Acknowledged,
                refuse_submissions: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ManualState<A>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of goals submitted so far.
    pub fn submission_count(&self) -> usize {
        self.lock().submissions.len()
    }

    /// Goals in submission order.
    pub fn goals(&self) -> Vec<A::Goal> {
        self.lock().submissions.iter().map(|s| s.goal.clone()).collect()
    }

    pub fn latest_ticket(&self) -> Option<SubmissionTicket> {
        self.lock().submissions.last().map(|s| s.ticket)
    }

    /// Cancellation requests received, in order.
    pub fn cancel_requests(&self) -> Vec<GoalHandle> {
        self.lock().cancel_requests.clone()
    }

    /// What `request_cancel` answers from now on.
    pub fn set_cancel_ack(&self, ack: CancelAck) {
        self.lock().cancel_ack = ack;
    }

    /// Make `submit` fail from now on.
    pub fn refuse_submissions(&self, refuse: bool) {
        self.lock().refuse_submissions = refuse;
    }

    /// Accept a pending submission and notify its acceptance callback.
    pub fn accept(&self, ticket: &SubmissionTicket) -> Option<GoalHandle> {
        let handle = GoalHandle::new();
        self.answer(ticket, AcceptanceStatus::Accepted(handle))
            .then_some(handle)
    }

    /// Reject a pending submission and notify its acceptance callback.
    pub fn reject(&self, ticket: &SubmissionTicket) -> bool {
        self.answer(ticket, AcceptanceStatus::Rejected)
    }

    /// Accept the most recent submission.
    pub fn accept_latest(&self) -> Option<GoalHandle> {
        let ticket = self.latest_ticket()?;
        self.accept(&ticket)
    }

    /// Reject the most recent submission.
    pub fn reject_latest(&self) -> bool {
        match self.latest_ticket() {
            Some(ticket) => self.reject(&ticket),
            None => false,
        }
    }

    /// Change what `poll_acceptance` reports without invoking the
    /// acceptance callback, like a transport that only answers when asked.
    pub fn set_acceptance(&self, ticket: &SubmissionTicket, status: AcceptanceStatus) -> bool {
        let mut state = self.lock();
        match state.submissions.iter_mut().find(|s| s.ticket == *ticket) {
            Some(submission) if submission.status == AcceptanceStatus::Pending => {
                submission.status = status;
                true
            }
            _ => false,
        }
    }

    fn answer(&self, ticket: &SubmissionTicket, status: AcceptanceStatus) -> bool {
        let callback = {
            let mut state = self.lock();
            let Some(submission) = state.submissions.iter_mut().find(|s| s.ticket == *ticket)
            else {
                return false;
            };
            if submission.status != AcceptanceStatus::Pending {
                return false;
            }
            submission.status = status;
            submission.on_acceptance.take()
        };
        if let Some(callback) = callback {
            callback(status);
        }
        true
    }

    /// Deliver one feedback message for an accepted goal.
    pub fn publish_feedback(&self, goal: &GoalHandle, feedback: A::Feedback) -> bool {
        let callback = {
            let mut state = self.lock();
            let Some(submission) = find_accepted(&mut state, goal) else {
                return false;
            };
            submission.on_feedback.take()
        };
        let Some(mut callback) = callback else {
            return false;
        };
        callback(feedback);

        let mut state = self.lock();
        if let Some(submission) = find_accepted(&mut state, goal) {
            if submission.on_result.is_some() {
                submission.on_feedback = Some(callback);
            }
        }
        true
    }

    /// Deliver the terminal result of an accepted goal. Only the first
    /// result per goal is delivered.
    pub fn finish(&self, goal: &GoalHandle, result: GoalResult<A::Result>) -> bool {
        let callback = {
            let mut state = self.lock();
            let Some(submission) = find_accepted(&mut state, goal) else {
                return false;
            };
            submission.on_feedback = None;
            submission.on_result.take()
        };
        match callback {
            Some(callback) => {
                callback(result);
                true
            }
            None => false,
        }
    }
}

fn find_accepted<'a, A: ActionType>(
    state: &'a mut ManualState<A>,
    goal: &GoalHandle,
) -> Option<&'a mut Submission<A>> {
    state
        .submissions
        .iter_mut()
        .find(|s| s.status == AcceptanceStatus::Accepted(*goal))
}

impl<A: ActionType> ActionChannel<A> for ManualChannel<A> {
    fn name(&self) -> &str {
        &self.name
    }

    fn submit(
        &self,
        goal: A::Goal,
        callbacks: GoalCallbacks<A>,
    ) -> Result<SubmissionTicket, ChannelError> {
        let mut state = self.lock();
        if state.refuse_submissions {
            return Err(ChannelError::SubmissionRefused(format!(
                "{} is refusing goals",
                self.name
            )));
        }
        let ticket = SubmissionTicket::new();
        state.submissions.push(Submission {
            ticket,
            goal,
            status: AcceptanceStatus::Pending,
            on_acceptance: Some(callbacks.on_acceptance),
            on_feedback: Some(callbacks.on_feedback),
            on_result: Some(callbacks.on_result),
        });
        Ok(ticket)
    }

    fn poll_acceptance(&self, ticket: &SubmissionTicket) -> AcceptanceStatus {
        self.lock()
            .submissions
            .iter()
            .find(|s| s.ticket == *ticket)
            .map(|s| s.status)
            .unwrap_or(AcceptanceStatus::Pending)
    }

    fn request_cancel(
        &self,
        goal: &GoalHandle,
        _timeout: Duration,
    ) -> Result<CancelAck, ChannelError> {
        let mut state = self.lock();
        state.cancel_requests.push(*goal);
        Ok(state.cancel_ack)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde::{Deserialize, Serialize};

    use super::*;

    struct Count;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Progress(u32);

    impl ActionType for Count {
        type Goal = u32;
        type Feedback = Progress;
        type Result = u32;
    }

    fn recording_callbacks(log: Arc<Mutex<Vec<String>>>) -> GoalCallbacks<Count> {
        let (a, f, r) = (log.clone(), log.clone(), log);
        GoalCallbacks {
            on_acceptance: Box::new(move |status| {
                let label = match status {
                    AcceptanceStatus::Accepted(_) => "Accepted",
                    AcceptanceStatus::Rejected => "Rejected",
                    AcceptanceStatus::Pending => "Pending",
                };
                a.lock().unwrap().push(label.to_string());
            }),
            on_feedback: Box::new(move |fb| f.lock().unwrap().push(format!("fb {}", fb.0))),
            on_result: Box::new(move |res| r.lock().unwrap().push(format!("{:?}", res.code()))),
        }
    }

    #[test]
    fn notifications_follow_the_contract_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let channel = ManualChannel::<Count>::new("count");
        let ticket = channel.submit(3, recording_callbacks(log.clone())).unwrap();
        assert_eq!(channel.poll_acceptance(&ticket), AcceptanceStatus::Pending);

        let handle = channel.accept(&ticket).unwrap();
        assert_eq!(channel.poll_acceptance(&ticket), AcceptanceStatus::Accepted(handle));
        assert!(channel.publish_feedback(&handle, Progress(1)));
        assert!(channel.finish(&handle, GoalResult::Succeeded(3)));

        // Nothing is delivered after the result.
        assert!(!channel.publish_feedback(&handle, Progress(2)));
        assert!(!channel.finish(&handle, GoalResult::Aborted));

        let log = log.lock().unwrap();
        assert_eq!(*log, vec!["Accepted", "fb 1", "Succeeded"]);
    }

    #[test]
    fn acceptance_is_answered_once() {
        let channel = ManualChannel::<Count>::new("count");
        let ticket = channel.submit(1, GoalCallbacks::ignore()).unwrap();
        assert!(channel.reject(&ticket));
        assert!(channel.accept(&ticket).is_none());
        assert_eq!(channel.poll_acceptance(&ticket), AcceptanceStatus::Rejected);
    }

    #[test]
    fn cancel_requests_are_recorded() {
        let channel = ManualChannel::<Count>::new("count");
        channel.set_cancel_ack(CancelAck::TimedOut);
        let handle = GoalHandle::new();
        let ack = channel
            .request_cancel(&handle, Duration::from_millis(10))
            .unwrap();
        assert_eq!(ack, CancelAck::TimedOut);
        assert_eq!(channel.cancel_requests(), vec![handle]);
    }

    #[test]
    fn refused_submission_is_an_error() {
        let channel = ManualChannel::<Count>::new("count");
        channel.refuse_submissions(true);
        assert!(matches!(
            channel.submit(1, GoalCallbacks::ignore()),
            Err(ChannelError::SubmissionRefused(_))
        ));
        assert_eq!(channel.submission_count(), 0);
    }
}
