use thiserror::Error;

use crate::node::NodeId;

pub type Result<T> = std::result::Result<T, NodeError>;

/// Everything here points at a topology or programming defect rather than a
/// transient fault, so callers should surface it instead of retrying.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    #[error("node {0}: delta requested for non-output node without downstream context")]
    InvalidState(NodeId),

    #[error("node {node} is not a predecessor of downstream node {downstream}")]
    Linkage { node: NodeId, downstream: NodeId },

    #[error("node {node}: parallel arrays out of step ({what}: expected {expected}, found {found})")]
    IndexMismatch {
        node: NodeId,
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("malformed neuron document: {0}")]
    Deserialization(String),

    #[error("failed to encode document: {0}")]
    Serialization(String),

    #[error("no node with id {0}")]
    UnknownNode(NodeId),

    #[error("topology contains a cycle through node {0}")]
    Cycle(NodeId),

    #[error("expected {expected} values, got {found}")]
    CountMismatch { expected: usize, found: usize },
}

impl From<ron::error::SpannedError> for NodeError {
    fn from(e: ron::error::SpannedError) -> Self {
        NodeError::Deserialization(e.to_string())
    }
}

impl From<ron::Error> for NodeError {
    fn from(e: ron::Error) -> Self {
        NodeError::Serialization(e.to_string())
    }
}
