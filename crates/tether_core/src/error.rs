//! Error types for tether_core

use thiserror::Error;

use crate::node::NodeId;

/// Errors raised or reported by the reactive core
#[derive(Error, Debug)]
pub enum CoreError {
    /// A listener panicked while its node was notifying
    #[error("listener of node {node:?} panicked: {message}")]
    ListenerPanicked {
        /// Node whose notification was running
        node: NodeId,
        /// Panic payload rendered as text
        message: String,
    },

    /// An operation was attempted on a disposed node
    #[error("{operation} called on disposed node {node:?}")]
    UseAfterDispose {
        /// Node that was already disposed
        node: NodeId,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// Configuration could not be parsed
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] toml::de::Error),
}

/// Result type for tether_core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Render a panic payload as a message
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
