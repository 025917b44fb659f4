// register.rs — Registering adapters with a NodeRegistry.
//
// Every action adapter exposes the same three ports on top of its own, and
// every evaluator the same three. The helpers here merge those in and wrap
// the node constructor in a registry builder.

use std::any::type_name;

use tb_tree::{NodeConfig, NodeError, NodeKind, NodeManifest, NodeRegistry, PortsList, TreeNode};

use crate::action_node::{ActionNode, ActionNodeSetup, RemoteAction};
use crate::evaluator::{ActionEvaluator, EvaluatorNode};

pub const ACTION_NAME_PORT: &str = "action_name";
pub const TIMEOUT_PORT: &str = "timeout";
pub const FEEDBACK_PORT: &str = "feedback";
pub const PERFORMANCE_COST_PORT: &str = "performance_cost";
pub const RESOURCE_COST_PORT: &str = "resource_cost";

/// Ports every action adapter has.
pub fn action_base_ports() -> PortsList {
    PortsList::new()
        .input_with_default(ACTION_NAME_PORT, "", "Action server name")
        .input_with_default(
            TIMEOUT_PORT,
            0u64,
            "Timeout (ms) for server resolution, goal acceptance and cancellation",
        )
        .output(FEEDBACK_PORT, "Latest feedback published by the action server")
}

/// Ports every evaluator has.
pub fn evaluator_base_ports() -> PortsList {
    PortsList::new()
        .input(FEEDBACK_PORT, "Feedback sample to evaluate")
        .output(PERFORMANCE_COST_PORT, "Performance cost derived from the feedback")
        .output(RESOURCE_COST_PORT, "Resource cost derived from the feedback")
}

/// Register an action adapter type under `id`.
///
/// `make` builds a fresh action value per instantiated node; `setup` is
/// cloned into each node, so an external channel or resolver is shared.
pub fn register_action<T, F>(
    registry: &mut NodeRegistry,
    id: &str,
    setup: ActionNodeSetup<T::Action>,
    make: F,
) -> Result<(), NodeError>
where
    T: RemoteAction,
    F: Fn() -> T + Send + Sync + 'static,
{
    let manifest = NodeManifest {
        registration_id: id.to_string(),
        kind: NodeKind::Action,
        type_name: type_name::<T>().to_string(),
        ports: ActionNode::<T>::ports_list(),
    };
    registry.register_builder(
        manifest,
        Box::new(move |name: &str, config: NodeConfig| -> Box<dyn TreeNode> {
            Box::new(ActionNode::new(name, make(), config, setup.clone()))
        }),
    )
}

/// Register an evaluator type under `id`.
pub fn register_evaluator<E, F>(
    registry: &mut NodeRegistry,
    id: &str,
    make: F,
) -> Result<(), NodeError>
where
    E: ActionEvaluator,
    F: Fn() -> E + Send + Sync + 'static,
{
    let manifest = NodeManifest {
        registration_id: id.to_string(),
        kind: NodeKind::Evaluator,
        type_name: type_name::<E>().to_string(),
        ports: EvaluatorNode::<E>::ports_list(),
    };
    registry.register_builder(
        manifest,
        Box::new(move |name: &str, config: NodeConfig| -> Box<dyn TreeNode> {
            Box::new(EvaluatorNode::new(name, make(), config))
        }),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use tb_tree::{Blackboard, NodePorts, NodeStatus, PortDirection};

    use super::*;
    use crate::action::ActionType;
    use crate::channel::{ActionChannel, ManualChannel};
    use crate::evaluator::{DerivedCosts, Evaluation};
    use crate::params::ActionNodeParams;

    struct Sleep;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Progress {
        elapsed_ms: u64,
    }

    impl ActionType for Sleep {
        type Goal = u64;
        type Feedback = Progress;
        type Result = u64;
    }

    struct SleepClient;

    impl RemoteAction for SleepClient {
        type Action = Sleep;

        fn provided_ports() -> PortsList {
            PortsList::new()
                .input("msec", "How long to sleep")
                // Overrides the common description.
                .input_with_default(TIMEOUT_PORT, 100u64, "Short default timeout")
        }

        fn send_goal(&self, ports: &NodePorts) -> Option<u64> {
            ports.get_input("msec").ok()
        }
    }

    struct Flat;

    impl ActionEvaluator for Flat {
        type Action = Sleep;

        fn spin_once(&mut self, _feedback: &Progress, _ports: &NodePorts) -> Evaluation {
            Evaluation::running(DerivedCosts::new(1.0, 2.0))
        }
    }

    fn setup(channel: &Arc<ManualChannel<Sleep>>) -> ActionNodeSetup<Sleep> {
        let shared: Arc<dyn ActionChannel<Sleep>> = channel.clone();
        ActionNodeSetup::shared(
            ActionNodeParams::new("sleep_service", Duration::from_secs(1)),
            shared,
        )
    }

    #[test]
    fn action_manifest_merges_base_ports() {
        let channel = Arc::new(ManualChannel::new("sleep_service"));
        let mut registry = NodeRegistry::new();
        register_action(&mut registry, "Sleep", setup(&channel), || SleepClient).unwrap();

        let manifest = registry.manifest("Sleep").unwrap();
        assert_eq!(manifest.kind, NodeKind::Action);
        assert!(manifest.type_name.ends_with("SleepClient"));
        let ports = &manifest.ports;
        assert_eq!(ports.len(), 4);
        assert_eq!(ports.get(TIMEOUT_PORT).unwrap().default, Some(json!(100)));
        assert_eq!(ports.get(ACTION_NAME_PORT).unwrap().default, Some(json!("")));
        assert_eq!(
            ports.get(FEEDBACK_PORT).unwrap().direction,
            PortDirection::Output
        );
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let channel = Arc::new(ManualChannel::new("sleep_service"));
        let mut registry = NodeRegistry::new();
        register_action(&mut registry, "Sleep", setup(&channel), || SleepClient).unwrap();
        let err = register_action(&mut registry, "Sleep", setup(&channel), || SleepClient)
            .unwrap_err();
        assert!(matches!(err, NodeError::DuplicateRegistration(id) if id == "Sleep"));
    }

    #[test]
    fn instantiated_nodes_share_the_channel() {
        let channel = Arc::new(ManualChannel::new("sleep_service"));
        let mut registry = NodeRegistry::new();
        register_action(&mut registry, "Sleep", setup(&channel), || SleepClient).unwrap();

        let bb = Blackboard::new();
        let mut first = registry
            .instantiate("Sleep", "nap", NodeConfig::new(bb.clone()).bind("msec", "10"))
            .unwrap();
        let mut second = registry
            .instantiate("Sleep", "doze", NodeConfig::new(bb).bind("msec", "20"))
            .unwrap();

        assert_eq!(first.tick().unwrap(), NodeStatus::Running);
        assert_eq!(second.tick().unwrap(), NodeStatus::Running);
        assert_eq!(first.name(), "nap");
        assert_eq!(channel.goals(), vec![10, 20]);
    }

    #[test]
    fn evaluator_registration() {
        let mut registry = NodeRegistry::new();
        register_evaluator(&mut registry, "SleepCost", || Flat).unwrap();

        let manifest = registry.manifest("SleepCost").unwrap();
        assert_eq!(manifest.kind, NodeKind::Evaluator);
        assert!(manifest.ports.contains(PERFORMANCE_COST_PORT));
        assert!(manifest.ports.contains(RESOURCE_COST_PORT));

        let bb = Blackboard::new();
        bb.set("feedback", json!({ "elapsed_ms": 5 }));
        let mut node = registry
            .instantiate(
                "SleepCost",
                "cost",
                NodeConfig::new(bb.clone()).bind(FEEDBACK_PORT, "{feedback}"),
            )
            .unwrap();
        assert_eq!(node.tick().unwrap(), NodeStatus::Running);
        assert_eq!(bb.get("resource_cost"), Some(json!(2.0)));
    }

    #[test]
    fn unknown_id_cannot_be_instantiated() {
        let registry = NodeRegistry::new();
        let err = registry
            .instantiate("Nope", "x", NodeConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, NodeError::UnknownNodeType(_)));
    }
}
