// ports.rs — Declared input/output slots of a node type.
//
// A node type advertises its ports once (at registration). Instances bind
// each port either to a blackboard entry or to a literal in NodeConfig.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Data flow direction of a port.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PortDirection {
    Input,
    Output,
    InOut,
}

impl PortDirection {
    pub fn is_input(&self) -> bool {
        matches!(self, PortDirection::Input | PortDirection::InOut)
    }

    pub fn is_output(&self) -> bool {
        matches!(self, PortDirection::Output | PortDirection::InOut)
    }
}

/// One declared port.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortInfo {
    pub direction: PortDirection,

    /// Human-readable description shown by `tb ports`.
    #[serde(default)]
    pub description: String,

    /// Value used when an instance leaves an input unbound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// Ordered set of ports keyed by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct PortsList {
    ports: BTreeMap<String, PortInfo>,
}

impl PortsList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an input port without a default.
    pub fn input(self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.with(name, PortDirection::Input, description, None)
    }

    /// Declare an input port that falls back to `default` when unbound.
    pub fn input_with_default(
        self,
        name: impl Into<String>,
        default: impl Into<Value>,
        description: impl Into<String>,
    ) -> Self {
        self.with(name, PortDirection::Input, description, Some(default.into()))
    }

    /// Declare an output port.
    pub fn output(self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.with(name, PortDirection::Output, description, None)
    }

    fn with(
        mut self,
        name: impl Into<String>,
        direction: PortDirection,
        description: impl Into<String>,
        default: Option<Value>,
    ) -> Self {
        self.ports.insert(
            name.into(),
            PortInfo {
                direction,
                description: description.into(),
                default,
            },
        );
        self
    }

    /// Add every port of `other`. Ports already declared here win.
    pub fn merge(mut self, other: &PortsList) -> Self {
        for (name, info) in &other.ports {
            self.ports
                .entry(name.clone())
                .or_insert_with(|| info.clone());
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&PortInfo> {
        self.ports.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ports.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PortInfo)> {
        self.ports.iter()
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}
