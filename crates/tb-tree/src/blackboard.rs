// blackboard.rs — Shared key/value store and per-node port bindings.
//
// Nodes never touch the blackboard directly. Each node instance gets a
// NodePorts handle that resolves its declared ports through the instance's
// NodeConfig:
//
//   "{key}"    → blackboard entry `key`
//   "literal"  → parsed as JSON, falling back to a plain string (inputs only)
//   (unbound)  → the port's declared default (inputs), or the port name
//                itself as blackboard key (outputs)
//
// NodePorts is Clone + Send + Sync so asynchronous callbacks (e.g. action
// feedback delivered on a channel thread) can publish outputs.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::NodeError;
use crate::ports::PortsList;

/// Thread-safe key/value store shared by all nodes of a tree.
#[derive(Debug, Clone, Default)]
pub struct Blackboard {
    entries: Arc<RwLock<HashMap<String, Value>>>,
}

impl Blackboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    /// Decode an entry. `Ok(None)` when the key is absent.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, serde_json::Error> {
        self.get(key).map(serde_json::from_value).transpose()
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.into(), value);
    }

    pub fn set_as<T: Serialize>(
        &self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(value)?;
        self.set(key, value);
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.contains_key(key)
    }
}

/// Per-instance port bindings, as written in a tree description.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Port name → "{blackboard_key}" or a literal value.
    #[serde(default)]
    pub remapping: HashMap<String, String>,

    #[serde(skip)]
    pub blackboard: Blackboard,
}

impl NodeConfig {
    pub fn new(blackboard: Blackboard) -> Self {
        Self {
            remapping: HashMap::new(),
            blackboard,
        }
    }

    /// Bind `port` to a literal or a `{key}` reference.
    pub fn bind(mut self, port: impl Into<String>, value: impl Into<String>) -> Self {
        self.remapping.insert(port.into(), value.into());
        self
    }
}

/// Strip `{` `}` from a blackboard reference.
fn blackboard_key(binding: &str) -> Option<&str> {
    binding
        .strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
        .map(str::trim)
        .filter(|key| !key.is_empty())
}

/// Port accessor handed to node implementations and their hooks.
#[derive(Debug, Clone)]
pub struct NodePorts {
    node: Arc<str>,
    ports: Arc<PortsList>,
    remapping: Arc<HashMap<String, String>>,
    blackboard: Blackboard,
}

impl NodePorts {
    pub fn new(node: &str, ports: PortsList, config: NodeConfig) -> Self {
        Self {
            node: Arc::from(node),
            ports: Arc::new(ports),
            remapping: Arc::new(config.remapping),
            blackboard: config.blackboard,
        }
    }

    pub fn node_name(&self) -> &str {
        &self.node
    }

    pub fn ports(&self) -> &PortsList {
        &self.ports
    }

    pub fn blackboard(&self) -> &Blackboard {
        &self.blackboard
    }

    /// Resolve and decode an input port.
    ///
    /// An unbound input only sees its declared default; it never reads a
    /// blackboard entry that happens to share the port's name.
    pub fn get_input<T: DeserializeOwned>(&self, port: &str) -> Result<T, NodeError> {
        let info = self.ports.get(port).ok_or_else(|| NodeError::UndeclaredPort {
            node: self.node.to_string(),
            port: port.to_string(),
        })?;

        let value = match self.remapping.get(port) {
            Some(binding) => match blackboard_key(binding) {
                Some(key) => self.blackboard.get(key),
                None => return self.parse_literal(port, binding),
            },
            None => info.default.clone(),
        };

        let value = value.ok_or_else(|| NodeError::MissingInput {
            node: self.node.to_string(),
            port: port.to_string(),
        })?;
        serde_json::from_value(value).map_err(|e| self.type_error(port, e))
    }

    /// Like [`get_input`](Self::get_input) but maps a missing value to `None`.
    pub fn try_get_input<T: DeserializeOwned>(&self, port: &str) -> Result<Option<T>, NodeError> {
        match self.get_input(port) {
            Ok(value) => Ok(Some(value)),
            Err(NodeError::MissingInput { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Publish an output port.
    pub fn set_output<T: Serialize>(&self, port: &str, value: &T) -> Result<(), NodeError> {
        if !self.ports.get(port).is_some_and(|info| info.direction.is_output()) {
            return Err(NodeError::UndeclaredPort {
                node: self.node.to_string(),
                port: port.to_string(),
            });
        }

        let key = match self.remapping.get(port) {
            Some(binding) => blackboard_key(binding).ok_or_else(|| NodeError::PortType {
                node: self.node.to_string(),
                port: port.to_string(),
                reason: format!("output bound to literal '{}'", binding),
            })?,
            None => port,
        };

        self.blackboard
            .set_as(key, value)
            .map_err(|e| self.type_error(port, e))
    }

    fn parse_literal<T: DeserializeOwned>(&self, port: &str, literal: &str) -> Result<T, NodeError> {
        serde_json::from_str(literal)
            .or_else(|_| serde_json::from_value(Value::String(literal.to_string())))
            .map_err(|e| self.type_error(port, e))
    }

    fn type_error(&self, port: &str, err: serde_json::Error) -> NodeError {
        NodeError::PortType {
            node: self.node.to_string(),
            port: port.to_string(),
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ports() -> PortsList {
        PortsList::new()
            .input("msec", "sleep duration")
            .input_with_default("timeout", 0, "timeout (milliseconds)")
            .input_with_default("action_name", "", "server name")
            .output("feedback", "latest feedback")
    }

    #[test]
    fn literal_binding_parses_json_then_string() {
        let config = NodeConfig::default()
            .bind("msec", "2000")
            .bind("action_name", "sleep_service");
        let node = NodePorts::new("sleep", ports(), config);

        assert_eq!(node.get_input::<u64>("msec").unwrap(), 2000);
        assert_eq!(
            node.get_input::<String>("action_name").unwrap(),
            "sleep_service"
        );
    }

    #[test]
    fn blackboard_binding_reads_entry() {
        let bb = Blackboard::new();
        bb.set("duration", Value::from(750));
        let config = NodeConfig::new(bb).bind("msec", "{duration}");
        let node = NodePorts::new("sleep", ports(), config);
        assert_eq!(node.get_input::<u32>("msec").unwrap(), 750);
    }

    #[test]
    fn unbound_input_uses_default_or_reports_missing() {
        let node = NodePorts::new("sleep", ports(), NodeConfig::default());
        assert_eq!(node.get_input::<u64>("timeout").unwrap(), 0);
        assert!(matches!(
            node.get_input::<u64>("msec"),
            Err(NodeError::MissingInput { .. })
        ));
        assert_eq!(node.try_get_input::<u64>("msec").unwrap(), None);
    }

    #[test]
    fn unbound_input_ignores_same_named_entry() {
        let bb = Blackboard::new();
        bb.set("msec", Value::from(5));
        let node = NodePorts::new("sleep", ports(), NodeConfig::new(bb));
        assert_eq!(node.try_get_input::<u64>("msec").unwrap(), None);
    }

    #[test]
    fn missing_blackboard_entry_is_missing_input() {
        let config = NodeConfig::default().bind("msec", "{nowhere}");
        let node = NodePorts::new("sleep", ports(), config);
        assert!(matches!(
            node.get_input::<u64>("msec"),
            Err(NodeError::MissingInput { .. })
        ));
    }

    #[test]
    fn wrong_type_is_port_type_error() {
        let config = NodeConfig::default().bind("msec", "not-a-number");
        let node = NodePorts::new("sleep", ports(), config);
        assert!(matches!(
            node.get_input::<u64>("msec"),
            Err(NodeError::PortType { .. })
        ));
    }

    #[test]
    fn output_defaults_to_port_name_key() {
        let bb = Blackboard::new();
        let node = NodePorts::new("sleep", ports(), NodeConfig::new(bb.clone()));
        node.set_output("feedback", &42u32).unwrap();
        assert_eq!(bb.get_as::<u32>("feedback").unwrap(), Some(42));
    }

    #[test]
    fn output_follows_remapping() {
        let bb = Blackboard::new();
        let config = NodeConfig::new(bb.clone()).bind("feedback", "{progress}");
        let node = NodePorts::new("sleep", ports(), config);
        node.set_output("feedback", &"half").unwrap();
        assert_eq!(bb.get_as::<String>("progress").unwrap().as_deref(), Some("half"));
        assert!(!bb.contains("feedback"));
    }

    #[test]
    fn output_on_input_port_is_rejected() {
        let node = NodePorts::new("sleep", ports(), NodeConfig::default());
        assert!(matches!(
            node.set_output("msec", &1u32),
            Err(NodeError::UndeclaredPort { .. })
        ));
    }
}
