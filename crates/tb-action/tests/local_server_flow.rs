// End-to-end tests: registry-built adapters talking to a LocalActionServer
// whose notifications arrive on worker threads.

use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::json;
use tb_action::{
    register_action, register_evaluator, ActionEvaluator, ActionNodeParams, ActionNodeSetup,
    ActionType, ChannelResolver, DerivedCosts, Evaluation, EventDispatcher, GoalContext,
    GoalExecutor, GoalResult, JsonlSink, LocalActionServer, LocalResolver, MemorySink,
    RemoteAction,
};
use tb_tree::{Blackboard, NodeConfig, NodePorts, NodeRegistry, NodeStatus, PortsList, TreeNode};
use tempfile::tempdir;

struct Sleep;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SleepProgress {
    elapsed_ms: u64,
}

impl ActionType for Sleep {
    type Goal = u64;
    type Feedback = SleepProgress;
    type Result = bool;
}

/// Sleeps in 5ms steps, publishing progress after each.
struct SleepServer;

impl GoalExecutor<Sleep> for SleepServer {
    fn execute(&self, msec: u64, ctx: &GoalContext<Sleep>) -> GoalResult<bool> {
        let started = Instant::now();
        while (started.elapsed().as_millis() as u64) < msec {
            if ctx.is_cancel_requested() {
                return GoalResult::Cancelled;
            }
            thread::sleep(Duration::from_millis(5));
            ctx.publish_feedback(SleepProgress {
                elapsed_ms: started.elapsed().as_millis() as u64,
            });
        }
        GoalResult::Succeeded(true)
    }
}

struct SleepClient;

impl RemoteAction for SleepClient {
    type Action = Sleep;

    fn provided_ports() -> PortsList {
        PortsList::new().input_with_default("msec", 50u64, "Sleep duration (ms)")
    }

    fn send_goal(&self, ports: &NodePorts) -> Option<u64> {
        ports.get_input("msec").ok()
    }
}

struct SleepCost;

impl ActionEvaluator for SleepCost {
    type Action = Sleep;

    fn spin_once(&mut self, feedback: &SleepProgress, _ports: &NodePorts) -> Evaluation {
        Evaluation::running(DerivedCosts::new(feedback.elapsed_ms as f32, 1.0))
    }
}

fn registry_with(server: LocalActionServer<Sleep>, events: EventDispatcher) -> NodeRegistry {
    let resolver = LocalResolver::new();
    resolver.register(Arc::new(server));
    let resolver: Arc<dyn ChannelResolver<Sleep>> = Arc::new(resolver);

    let setup = ActionNodeSetup::resolving(
        ActionNodeParams::new("sleep_service", Duration::from_secs(2)),
        resolver,
    )
    .with_events(Arc::new(events));

    let mut registry = NodeRegistry::new();
    register_action(&mut registry, "Sleep", setup, || SleepClient).unwrap();
    register_evaluator(&mut registry, "SleepCost", || SleepCost).unwrap();
    registry
}

fn tick_until_done(node: &mut dyn TreeNode, limit: Duration) -> NodeStatus {
    let deadline = Instant::now() + limit;
    loop {
        let status = node.tick().unwrap();
        if status.is_completed() || Instant::now() > deadline {
            return status;
        }
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn sleep_goal_runs_to_success() {
    let memory = MemorySink::new();
    let registry = registry_with(
        LocalActionServer::new("sleep_service", SleepServer),
        EventDispatcher::new().with_sink(memory.clone()),
    );

    let bb = Blackboard::new();
    let config = NodeConfig::new(bb.clone())
        .bind("msec", "30")
        .bind("feedback", "{sleep_feedback}");
    let mut node = registry.instantiate("Sleep", "nap", config).unwrap();

    assert_eq!(tick_until_done(node.as_mut(), Duration::from_secs(5)), NodeStatus::Success);
    assert!(bb.contains("sleep_feedback"));

    let types = memory.event_types();
    // Feedback events come from the worker thread and may interleave.
    assert!(types.iter().any(|t| t == "goal_submitted"));
    assert!(types.iter().any(|t| t == "goal_accepted"));
    assert_eq!(types.last().map(String::as_str), Some("session_finished"));
}

#[test]
fn evaluator_follows_action_feedback() {
    let registry = registry_with(
        LocalActionServer::new("sleep_service", SleepServer),
        EventDispatcher::new(),
    );

    let bb = Blackboard::new();
    let mut action = registry
        .instantiate(
            "Sleep",
            "nap",
            NodeConfig::new(bb.clone())
                .bind("msec", "40")
                .bind("feedback", "{progress}"),
        )
        .unwrap();
    let mut evaluator = registry
        .instantiate(
            "SleepCost",
            "cost",
            NodeConfig::new(bb.clone()).bind("feedback", "{progress}"),
        )
        .unwrap();

    // No feedback yet: the evaluator's tick is an error.
    assert!(evaluator.tick().is_err());

    let status = tick_until_done(action.as_mut(), Duration::from_secs(5));
    assert_eq!(status, NodeStatus::Success);
    assert_eq!(evaluator.tick().unwrap(), NodeStatus::Running);
    assert_eq!(bb.get("resource_cost"), Some(json!(1.0)));
    assert!(bb.get("performance_cost").is_some());
}

#[test]
fn halt_cancels_goal_on_server() {
    let server = Arc::new(LocalActionServer::new("sleep_service", SleepServer));
    let resolver = LocalResolver::new();
    resolver.register(Arc::clone(&server));
    let resolver: Arc<dyn ChannelResolver<Sleep>> = Arc::new(resolver);
    let setup = ActionNodeSetup::resolving(
        ActionNodeParams::new("sleep_service", Duration::from_secs(2)),
        resolver,
    );
    let mut registry = NodeRegistry::new();
    register_action(&mut registry, "Sleep", setup, || SleepClient).unwrap();

    let mut node = registry
        .instantiate("Sleep", "nap", NodeConfig::default().bind("msec", "10000"))
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while server.active_goals() == 0 && Instant::now() < deadline {
        assert_eq!(node.tick().unwrap(), NodeStatus::Running);
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(node.tick().unwrap(), NodeStatus::Running);

    node.halt();
    assert_eq!(node.status(), NodeStatus::Idle);
    assert_eq!(server.active_goals(), 0);
}

#[test]
fn slow_acceptance_times_out_and_is_logged() {
    let dir = tempdir().unwrap();
    let log = dir.path().join("events.jsonl");
    let registry = registry_with(
        LocalActionServer::new("sleep_service", SleepServer)
            .with_acceptance_delay(Duration::from_millis(300)),
        EventDispatcher::new().with_sink(JsonlSink::new(&log)),
    );

    let mut node = registry
        .instantiate(
            "Sleep",
            "nap",
            NodeConfig::default().bind("msec", "10").bind("timeout", "20"),
        )
        .unwrap();

    let status = tick_until_done(node.as_mut(), Duration::from_secs(5));
    assert_eq!(status, NodeStatus::Failure);

    let content = fs::read_to_string(&log).unwrap();
    assert!(content.contains("\"error\":\"goal_acceptance_timeout\""));
    assert!(!content.contains("goal_accepted"));
}

#[test]
fn offline_server_is_unreachable() {
    let server = Arc::new(LocalActionServer::new("sleep_service", SleepServer));
    server.set_online(false);
    let resolver = LocalResolver::new();
    resolver.register(Arc::clone(&server));
    let resolver: Arc<dyn ChannelResolver<Sleep>> = Arc::new(resolver);

    let memory = MemorySink::new();
    let setup = ActionNodeSetup::resolving(
        ActionNodeParams::new("sleep_service", Duration::from_millis(20)),
        resolver,
    )
    .with_events(Arc::new(EventDispatcher::new().with_sink(memory.clone())));
    let mut registry = NodeRegistry::new();
    register_action(&mut registry, "Sleep", setup, || SleepClient).unwrap();

    let mut node = registry
        .instantiate("Sleep", "nap", NodeConfig::default())
        .unwrap();
    assert_eq!(node.tick().unwrap(), NodeStatus::Failure);
    assert_eq!(
        memory.event_types(),
        vec!["session_failed", "session_finished"]
    );
}
