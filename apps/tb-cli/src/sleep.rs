// sleep.rs — The demo `Sleep` action: client hooks, server, and evaluator.
//
// The server sleeps for the requested number of milliseconds in short
// cycles, publishing progress after each one and stopping early when
// cancelled. SleepCost turns that progress into costs.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tb_action::{
    register_action, register_evaluator, ActionEvaluator, ActionNodeParams, ActionNodeSetup,
    ActionType, ChannelResolver, DerivedCosts, Evaluation, EventDispatcher, GoalContext,
    GoalExecutor, GoalResult, LocalActionServer, LocalResolver, RemoteAction,
};
use tb_tree::{NodePorts, NodeRegistry, NodeStatus, PortsList};

pub const SLEEP_ID: &str = "Sleep";
pub const SLEEP_COST_ID: &str = "SleepCost";

const CYCLE: Duration = Duration::from_millis(50);

pub struct Sleep;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SleepGoal {
    pub msec: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepFeedback {
    pub cycle: u32,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SleepResult {
    pub done: bool,
    pub elapsed_ms: u64,
}

impl ActionType for Sleep {
    type Goal = SleepGoal;
    type Feedback = SleepFeedback;
    type Result = SleepResult;
}

/// Client side: reads `msec` and reports the final progress as feedback.
pub struct SleepAction;

impl RemoteAction for SleepAction {
    type Action = Sleep;

    fn provided_ports() -> PortsList {
        PortsList::new().input("msec", "How long the server should sleep (ms)")
    }

    fn send_goal(&self, ports: &NodePorts) -> Option<SleepGoal> {
        match ports.get_input::<u64>("msec") {
            Ok(msec) => Some(SleepGoal { msec }),
            Err(e) => {
                tracing::warn!("{}: {}", ports.node_name(), e);
                None
            }
        }
    }

    fn on_result(&self, result: &SleepResult, ports: &NodePorts) -> NodeStatus {
        if let Some(feedback) = self.result_to_feedback(result) {
            if let Err(e) = ports.set_output("feedback", &feedback) {
                tracing::warn!("{}: {}", ports.node_name(), e);
            }
        }
        if result.done {
            NodeStatus::Success
        } else {
            NodeStatus::Failure
        }
    }

    fn result_to_feedback(&self, result: &SleepResult) -> Option<SleepFeedback> {
        Some(SleepFeedback {
            cycle: 0,
            elapsed_ms: result.elapsed_ms,
        })
    }
}

/// Server side of the sleep action.
#[derive(Default)]
pub struct SleepServer;

impl GoalExecutor<Sleep> for SleepServer {
    fn execute(&self, goal: SleepGoal, ctx: &GoalContext<Sleep>) -> GoalResult<SleepResult> {
        let target = Duration::from_millis(goal.msec);
        let started = Instant::now();
        let mut cycle = 0;

        while started.elapsed() < target {
            if ctx.is_cancel_requested() {
                tracing::debug!("{} cancelled after {} cycles", ctx.handle(), cycle);
                return GoalResult::Cancelled;
            }
            thread::sleep(CYCLE.min(target.saturating_sub(started.elapsed())));
            cycle += 1;
            ctx.publish_feedback(SleepFeedback {
                cycle,
                elapsed_ms: started.elapsed().as_millis() as u64,
            });
        }

        GoalResult::Succeeded(SleepResult {
            done: true,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }
}

/// Performance cost is the fraction of `budget_ms` already spent; resource
/// cost grows with the number of cycles.
pub struct SleepCost;

impl ActionEvaluator for SleepCost {
    type Action = Sleep;

    fn provided_ports() -> PortsList {
        PortsList::new().input_with_default("budget_ms", 1000u64, "Expected sleep (ms)")
    }

    fn spin_once(&mut self, feedback: &SleepFeedback, ports: &NodePorts) -> Evaluation {
        let budget = ports.get_input::<u64>("budget_ms").unwrap_or(1000).max(1);
        Evaluation::running(DerivedCosts::new(
            feedback.elapsed_ms as f32 / budget as f32,
            feedback.cycle as f32 * 0.1,
        ))
    }
}

/// Registry with `Sleep` and `SleepCost`, backed by a fresh in-process
/// server named after `params.action_name`.
pub fn demo_registry(
    params: &ActionNodeParams,
    events: EventDispatcher,
) -> anyhow::Result<NodeRegistry> {
    let resolver = LocalResolver::new();
    resolver.register(Arc::new(LocalActionServer::new(
        params.action_name.clone(),
        SleepServer,
    )));
    let resolver: Arc<dyn ChannelResolver<Sleep>> = Arc::new(resolver);

    let setup = ActionNodeSetup::resolving(params.clone(), resolver).with_events(Arc::new(events));

    let mut registry = NodeRegistry::new();
    register_action(&mut registry, SLEEP_ID, setup, || SleepAction)?;
    register_evaluator(&mut registry, SLEEP_COST_ID, || SleepCost)?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tb_tree::{Blackboard, NodeConfig};

    use super::*;

    #[test]
    fn registry_lists_both_node_types() {
        let registry = demo_registry(
            &ActionNodeParams::new("sleep_service", Duration::from_millis(200)),
            EventDispatcher::new(),
        )
        .unwrap();
        let ids: Vec<_> = registry
            .manifests()
            .map(|m| m.registration_id.as_str())
            .collect();
        assert_eq!(ids, vec![SLEEP_ID, SLEEP_COST_ID]);
    }

    #[test]
    fn cost_is_fraction_of_budget() {
        let bb = Blackboard::new();
        bb.set("feedback", json!({ "cycle": 5, "elapsed_ms": 250 }));
        let config = NodeConfig::new(bb.clone())
            .bind("feedback", "{feedback}")
            .bind("budget_ms", "500");
        let mut node = tb_action::EvaluatorNode::new("cost", SleepCost, config);

        assert_eq!(node.poll(), Ok(NodeStatus::Running));
        assert_eq!(bb.get("performance_cost"), Some(json!(0.5)));
        assert_eq!(node.costs().map(|c| c.performance_cost), Some(0.5));
    }

    #[test]
    fn unfinished_result_is_failure() {
        let bb = Blackboard::new();
        let ports = NodePorts::new(
            "sleep",
            tb_action::ActionNode::<SleepAction>::ports_list(),
            NodeConfig::new(bb.clone()),
        );
        let result = SleepResult {
            done: false,
            elapsed_ms: 10,
        };
        assert_eq!(SleepAction.on_result(&result, &ports), NodeStatus::Failure);
        assert_eq!(bb.get("feedback"), Some(json!({ "cycle": 0, "elapsed_ms": 10 })));
    }
}
