//! Protocol error types.

use thiserror::Error;

/// Protocol-level errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Invalid message or frame format.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// A group name that the channel layer cannot route.
    #[error("invalid group name {name:?}: {reason}")]
    InvalidGroupName { name: String, reason: String },
}
