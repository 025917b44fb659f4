// error.rs — Error types for the tree-node contract.

use thiserror::Error;

/// Errors raised while resolving ports, building nodes, or ticking them.
#[derive(Debug, Error)]
pub enum NodeError {
    /// An input port has no remapping, no literal, and no default.
    #[error("node '{node}' missing required input [{port}]")]
    MissingInput { node: String, port: String },

    /// A port value exists but could not be decoded as the requested type.
    #[error("node '{node}' port [{port}] has an unexpected type: {reason}")]
    PortType {
        node: String,
        port: String,
        reason: String,
    },

    /// The port is not declared in the node's port list.
    #[error("node '{node}' has no port named [{port}]")]
    UndeclaredPort { node: String, port: String },

    /// No builder is registered under this id.
    #[error("unknown node type: {0}")]
    UnknownNodeType(String),

    /// A builder is already registered under this id.
    #[error("node type already registered: {0}")]
    DuplicateRegistration(String),

    /// A node-specific failure while ticking (e.g. a misconfigured input).
    #[error("node '{node}' failed: {source}")]
    Runtime {
        node: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl NodeError {
    /// Wrap a node-specific error.
    pub fn runtime(
        node: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        NodeError::Runtime {
            node: node.into(),
            source: Box::new(source),
        }
    }
}
