//! changecast server library.
//!
//! This crate wires the broadcast router to NNG sockets: change events arrive
//! on a PULL socket ([`Ingest`]), are routed by the core router, and leave as
//! topic-prefixed frames on a PUB socket ([`Publisher`]). [`GroupSubscriber`]
//! is the matching client.

pub mod config;
pub mod error;
pub mod ingest;
pub mod publisher;
pub mod subscriber;

pub use config::{Args, ServerConfig};
pub use error::Error;
pub use ingest::Ingest;
pub use publisher::{create_publisher, Publisher};
pub use subscriber::GroupSubscriber;
