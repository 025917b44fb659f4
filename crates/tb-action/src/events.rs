// events.rs — Adapter events and sinks.
//
// Adapters emit an AdapterEvent at each step of a goal session. The tick
// result only says Success or Failure; events are where the reason for a
// Failure (timeout, rejection, abort...) stays visible after the fact.
//
// Sinks are synchronous and best-effort: a failing sink is logged and the
// adapter carries on.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tb_tree::NodeStatus;
use uuid::Uuid;

use crate::action::ResultCode;
use crate::channel::CancelAck;
use crate::error::{ActionNodeError, EventError};

/// Lifecycle events of a goal session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AdapterEvent {
    /// A goal was handed to the channel.
    GoalSubmitted {
        node: String,
        action_name: String,
        session_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    GoalAccepted {
        node: String,
        session_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    GoalRejected {
        node: String,
        session_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// One feedback message, as written to the `feedback` port.
    FeedbackReceived {
        node: String,
        session_id: Uuid,
        feedback: serde_json::Value,
        timestamp: DateTime<Utc>,
    },

    ResultReceived {
        node: String,
        session_id: Uuid,
        code: ResultCode,
        timestamp: DateTime<Utc>,
    },

    CancelRequested {
        node: String,
        session_id: Uuid,
        ack: Option<CancelAck>,
        timestamp: DateTime<Utc>,
    },

    /// An operational error was handed to the failure hook.
    SessionFailed {
        node: String,
        session_id: Option<Uuid>,
        error: ActionNodeError,
        timestamp: DateTime<Utc>,
    },

    /// The session ended with this caller-visible status.
    SessionFinished {
        node: String,
        session_id: Option<Uuid>,
        status: NodeStatus,
        timestamp: DateTime<Utc>,
    },
}

impl AdapterEvent {
    pub fn event_type(&self) -> &str {
        match self {
            AdapterEvent::GoalSubmitted { .. } => "goal_submitted",
            AdapterEvent::GoalAccepted { .. } => "goal_accepted",
            AdapterEvent::GoalRejected { .. } => "goal_rejected",
            AdapterEvent::FeedbackReceived { .. } => "feedback_received",
            AdapterEvent::ResultReceived { .. } => "result_received",
            AdapterEvent::CancelRequested { .. } => "cancel_requested",
            AdapterEvent::SessionFailed { .. } => "session_failed",
            AdapterEvent::SessionFinished { .. } => "session_finished",
        }
    }

    /// Name of the node that emitted the event.
    pub fn node(&self) -> &str {
        match self {
            AdapterEvent::GoalSubmitted { node, .. }
            | AdapterEvent::GoalAccepted { node, .. }
            | AdapterEvent::GoalRejected { node, .. }
            | AdapterEvent::FeedbackReceived { node, .. }
            | AdapterEvent::ResultReceived { node, .. }
            | AdapterEvent::CancelRequested { node, .. }
            | AdapterEvent::SessionFailed { node, .. }
            | AdapterEvent::SessionFinished { node, .. } => node,
        }
    }

    pub fn goal_submitted(node: &str, action_name: &str, session_id: Uuid) -> Self {
        AdapterEvent::GoalSubmitted {
            node: node.to_string(),
            action_name: action_name.to_string(),
            session_id,
            timestamp: Utc::now(),
        }
    }

    pub fn goal_accepted(node: &str, session_id: Uuid) -> Self {
        AdapterEvent::GoalAccepted {
            node: node.to_string(),
            session_id,
            timestamp: Utc::now(),
        }
    }

    pub fn goal_rejected(node: &str, session_id: Uuid) -> Self {
        AdapterEvent::GoalRejected {
            node: node.to_string(),
            session_id,
            timestamp: Utc::now(),
        }
    }

    pub fn feedback_received(node: &str, session_id: Uuid, feedback: serde_json::Value) -> Self {
        AdapterEvent::FeedbackReceived {
            node: node.to_string(),
            session_id,
            feedback,
            timestamp: Utc::now(),
        }
    }

    pub fn result_received(node: &str, session_id: Uuid, code: ResultCode) -> Self {
        AdapterEvent::ResultReceived {
            node: node.to_string(),
            session_id,
            code,
            timestamp: Utc::now(),
        }
    }

    pub fn cancel_requested(node: &str, session_id: Uuid, ack: Option<CancelAck>) -> Self {
        AdapterEvent::CancelRequested {
            node: node.to_string(),
            session_id,
            ack,
            timestamp: Utc::now(),
        }
    }

    pub fn session_failed(node: &str, session_id: Option<Uuid>, error: ActionNodeError) -> Self {
        AdapterEvent::SessionFailed {
            node: node.to_string(),
            session_id,
            error,
            timestamp: Utc::now(),
        }
    }

    pub fn session_finished(node: &str, session_id: Option<Uuid>, status: NodeStatus) -> Self {
        AdapterEvent::SessionFinished {
            node: node.to_string(),
            session_id,
            status,
            timestamp: Utc::now(),
        }
    }
}

/// Receives adapter events.
///
/// Sinks are shared between an adapter and its channel callbacks, so they
/// must be `Send + Sync`.
pub trait EventSink: Send + Sync {
    /// Handle an event. Errors are logged but never affect the adapter.
    fn send(&self, event: &AdapterEvent) -> Result<(), EventError>;
}

/// Appends events as JSONL to a file.
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> EventError {
    let path = path.display().to_string();
    move |source| EventError::IoError { path, source }
}

impl EventSink for JsonlSink {
    /// Appends one line per event. The line is written with a single call,
    /// so events sent from several callback threads never interleave.
    fn send(&self, event: &AdapterEvent) -> Result<(), EventError> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(line.as_bytes()))
            .map_err(io_error(&self.path))
    }
}

/// Keeps events in memory. Clones share the same buffer.
#[derive(Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<AdapterEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AdapterEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Event type names in arrival order.
    pub fn event_types(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|e| e.event_type().to_string())
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl EventSink for MemorySink {
    fn send(&self, event: &AdapterEvent) -> Result<(), EventError> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
        Ok(())
    }
}

/// Fans events out to every registered sink.
pub struct EventDispatcher {
    sinks: Vec<Box<dyn EventSink>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn add_sink(&mut self, sink: Box<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn with_sink(mut self, sink: impl EventSink + 'static) -> Self {
        self.add_sink(Box::new(sink));
        self
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    pub fn dispatch(&self, event: &AdapterEvent) {
        for sink in &self.sinks {
            if let Err(e) = sink.send(event) {
                tracing::warn!("adapter event sink error: {}", e);
            }
        }
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
