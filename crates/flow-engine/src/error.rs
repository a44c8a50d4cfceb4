//! Error types for the flow engine

use thiserror::Error;

use crate::types::{EdgeId, NodeId};
use crate::validation::ValidationError;

/// Result type alias using FlowError
pub type Result<T> = std::result::Result<T, FlowError>;

/// Errors that can occur while editing or running a flow
#[derive(Debug, Error)]
pub enum FlowError {
    /// A proposed connection or grouping was rejected
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Node not present in the workspace
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// Edge not present in the workspace
    #[error("Edge not found: {0}")]
    EdgeNotFound(EdgeId),

    /// The node is executing and cannot be reconfigured
    #[error("Node '{0}' is busy")]
    NodeBusy(NodeId),

    /// The workspace is executing a flow
    #[error("Workspace is executing a flow")]
    WorkspaceBusy,

    /// Undo stack is empty
    #[error("Nothing to undo")]
    NothingToUndo,

    /// Paste requested with an empty clipboard
    #[error("Clipboard is empty")]
    ClipboardEmpty,

    /// No factory registered for a component type
    #[error("Unknown component type: {0}")]
    UnknownComponentType(String),

    /// A component factory rejected its configuration
    #[error("Invalid configuration for '{component_type}': {message}")]
    InvalidConfig {
        component_type: String,
        message: String,
    },

    /// A user request was refused (disabled, unconfirmed or unknown)
    #[error("Request rejected: {0}")]
    RequestRejected(String),

    /// Start point or listener execution failed
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// Run was cancelled by stop()
    #[error("Flow cancelled")]
    Cancelled,

    /// Snapshot, clipboard or file payload could not be encoded/decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Compression error
    #[error("Compression error: {0}")]
    Compression(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FlowError {
    /// Create an execution failed error with a message
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::ExecutionFailed(msg.into())
    }

    /// Create a serialization error with a message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Whether this error belongs to the serialization class
    ///
    /// Memory pressure while encoding snapshots surfaces through the same
    /// variants and is treated identically.
    pub fn is_serialization(&self) -> bool {
        matches!(
            self,
            Self::Serialization(_)
                | Self::Json(_)
                | Self::Compression(_)
                | Self::Io(_)
                | Self::UnknownComponentType(_)
                | Self::InvalidConfig { .. }
        )
    }

    /// Whether this error is a synchronous validation rejection
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<bincode::error::EncodeError> for FlowError {
    fn from(err: bincode::error::EncodeError) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for FlowError {
    fn from(err: bincode::error::DecodeError) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for FlowError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert!(FlowError::serialization("boom").is_serialization());
        assert!(FlowError::Compression("zstd".into()).is_serialization());
        assert!(!FlowError::WorkspaceBusy.is_serialization());
        assert!(FlowError::from(ValidationError::EmptyGroupName).is_validation());
    }

    #[test]
    fn test_display() {
        let err = FlowError::NodeBusy("node-1".to_string());
        assert_eq!(err.to_string(), "Node 'node-1' is busy");
    }
}
