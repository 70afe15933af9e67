//! changecast protocol types.
//!
//! This crate defines the values that flow through a change broadcast: the
//! committed [`ChangeEvent`] handed to the router, the [`GroupName`] a
//! message is addressed to, and the [`BroadcastMessage`] envelope subscribers
//! receive.
//!
//! # Modules
//!
//! - [`event`] - Change notifications from the persistence layer
//! - [`group`] - Group names and the placeholder group
//! - [`message`] - Broadcast messages and their JSON envelope
//! - [`framing`] - Topic framing for publish/subscribe sockets
//! - [`error`] - Protocol error types

pub mod error;
pub mod event;
pub mod framing;
pub mod group;
pub mod message;

pub use error::Error;

pub use event::ChangeEvent;
pub use group::{GroupName, PLACEHOLDER_GROUP};
pub use message::{BroadcastMessage, MessageKind, HANDLER_TYPE};
