//! Core error types.

use thiserror::Error;

/// Errors raised while routing and delivering change broadcasts.
#[derive(Debug, Error)]
pub enum Error {
    /// The transport could not deliver or enqueue a message.
    #[error("transport error: {0}")]
    Transport(String),

    /// The event carries no channel, user or author identity.
    #[error("malformed change event: {0}")]
    MalformedEvent(String),

    /// A change record could not be serialized into a payload.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] changecast_proto::Error),
}
