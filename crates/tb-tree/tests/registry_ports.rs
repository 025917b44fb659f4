// Nodes built through the registry exchange data over a shared blackboard.

use serde_json::json;
use tb_tree::{
    Blackboard, NodeConfig, NodeError, NodeKind, NodeManifest, NodePorts, NodeRegistry,
    NodeStatus, PortsList, TreeNode,
};

/// Adds `step` to `value` and writes the sum to `sum`.
struct Accumulate {
    name: String,
    ports: NodePorts,
    status: NodeStatus,
}

fn accumulate_ports() -> PortsList {
    PortsList::new()
        .input("value", "Number to add to")
        .input_with_default("step", 1, "Increment")
        .output("sum", "Result")
}

impl TreeNode for Accumulate {
    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> NodeStatus {
        self.status
    }

    fn tick(&mut self) -> Result<NodeStatus, NodeError> {
        let value: i64 = self.ports.get_input("value")?;
        let step: i64 = self.ports.get_input("step")?;
        self.ports.set_output("sum", &(value + step))?;
        self.status = NodeStatus::Success;
        Ok(self.status)
    }

    fn halt(&mut self) {
        self.status = NodeStatus::Idle;
    }
}

fn registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    registry
        .register_builder(
            NodeManifest {
                registration_id: "Accumulate".into(),
                kind: NodeKind::Other,
                type_name: "Accumulate".into(),
                ports: accumulate_ports(),
            },
            Box::new(|name: &str, config: NodeConfig| -> Box<dyn TreeNode> {
                Box::new(Accumulate {
                    name: name.to_string(),
                    ports: NodePorts::new(name, accumulate_ports(), config),
                    status: NodeStatus::Idle,
                })
            }),
        )
        .unwrap();
    registry
}

#[test]
fn chained_nodes_share_blackboard_entries() {
    let registry = registry();
    let bb = Blackboard::new();

    let mut first = registry
        .instantiate(
            "Accumulate",
            "first",
            NodeConfig::new(bb.clone())
                .bind("value", "40")
                .bind("sum", "{partial}"),
        )
        .unwrap();
    let mut second = registry
        .instantiate(
            "Accumulate",
            "second",
            NodeConfig::new(bb.clone())
                .bind("value", "{partial}")
                .bind("step", "{increment}")
                .bind("sum", "{total}"),
        )
        .unwrap();

    bb.set("increment", json!(2));
    assert_eq!(first.tick().unwrap(), NodeStatus::Success);
    assert_eq!(second.tick().unwrap(), NodeStatus::Success);

    assert_eq!(bb.get("partial"), Some(json!(41)));
    assert_eq!(bb.get("total"), Some(json!(43)));
}

#[test]
fn missing_blackboard_entry_surfaces_as_missing_input() {
    let registry = registry();
    let bb = Blackboard::new();
    let mut node = registry
        .instantiate(
            "Accumulate",
            "lonely",
            NodeConfig::new(bb).bind("value", "{never_set}"),
        )
        .unwrap();

    let err = node.tick().unwrap_err();
    assert!(matches!(err, NodeError::MissingInput { ref port, .. } if port == "value"));
    assert_eq!(node.status(), NodeStatus::Idle);
}

#[test]
fn manifests_describe_registered_ports() {
    let registry = registry();
    let manifests: Vec<_> = registry.manifests().collect();
    assert_eq!(manifests.len(), 1);

    let json = serde_json::to_value(manifests[0]).unwrap();
    assert_eq!(json["registration_id"], "Accumulate");
    assert_eq!(json["ports"]["step"]["default"], json!(1));
    assert_eq!(json["ports"]["sum"]["direction"], "output");
}
