//! The group-send seam between the router and a message bus.

use std::future::Future;
use std::sync::Arc;

use changecast_proto::{BroadcastMessage, GroupName};

use crate::error::Error;

/// A publish/subscribe transport that can deliver a message to a group.
///
/// Destinations are opaque routing keys: either a computed group name or a
/// raw user identity. Group membership is owned by the transport.
pub trait GroupTransport: Send + Sync {
    /// Deliver `message` to every member of `destination`.
    fn group_send(
        &self,
        destination: &GroupName,
        message: BroadcastMessage,
    ) -> impl Future<Output = Result<(), Error>> + Send;
}

impl<T: GroupTransport> GroupTransport for Arc<T> {
    fn group_send(
        &self,
        destination: &GroupName,
        message: BroadcastMessage,
    ) -> impl Future<Output = Result<(), Error>> + Send {
        (**self).group_send(destination, message)
    }
}
