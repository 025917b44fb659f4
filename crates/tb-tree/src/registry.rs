// registry.rs — NodeRegistry: builds node instances by registration id.
//
// Concrete node types register a builder together with a manifest that
// declares their ports. A tree loader (external) then asks the registry
// for instances by id.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::blackboard::NodeConfig;
use crate::error::NodeError;
use crate::node::TreeNode;
use crate::ports::PortsList;

/// Broad category of a registered node type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Submits goals to a remote action endpoint.
    Action,
    /// Samples feedback and derives costs.
    Evaluator,
    /// Anything else (synchronous helpers, conditions, ...).
    Other,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Action => write!(f, "action"),
            NodeKind::Evaluator => write!(f, "evaluator"),
            NodeKind::Other => write!(f, "other"),
        }
    }
}

/// Static description of a registered node type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeManifest {
    pub registration_id: String,
    pub kind: NodeKind,
    /// Rust type name of the concrete node, for diagnostics.
    pub type_name: String,
    pub ports: PortsList,
}

/// Builds one node instance from its name and port bindings.
pub type NodeBuilder = Box<dyn Fn(&str, NodeConfig) -> Box<dyn TreeNode> + Send + Sync>;

struct Registration {
    manifest: NodeManifest,
    builder: NodeBuilder,
}

/// Registered node types keyed by registration id.
#[derive(Default)]
pub struct NodeRegistry {
    entries: BTreeMap<String, Registration>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a builder under `manifest.registration_id`.
    pub fn register_builder(
        &mut self,
        manifest: NodeManifest,
        builder: NodeBuilder,
    ) -> Result<(), NodeError> {
        let id = manifest.registration_id.clone();
        if self.entries.contains_key(&id) {
            return Err(NodeError::DuplicateRegistration(id));
        }
        tracing::debug!("registered {} node '{}' ({})", manifest.kind, id, manifest.type_name);
        self.entries.insert(id, Registration { manifest, builder });
        Ok(())
    }

    /// Build a new instance of the node type registered as `id`.
    pub fn instantiate(
        &self,
        id: &str,
        instance_name: &str,
        config: NodeConfig,
    ) -> Result<Box<dyn TreeNode>, NodeError> {
        let registration = self
            .entries
            .get(id)
            .ok_or_else(|| NodeError::UnknownNodeType(id.to_string()))?;
        Ok((registration.builder)(instance_name, config))
    }

    pub fn manifest(&self, id: &str) -> Option<&NodeManifest> {
        self.entries.get(id).map(|r| &r.manifest)
    }

    /// All manifests, ordered by registration id.
    pub fn manifests(&self) -> impl Iterator<Item = &NodeManifest> {
        self.entries.values().map(|r| &r.manifest)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
