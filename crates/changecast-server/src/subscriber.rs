//! Client side of the publisher: an NNG SUB socket joined to groups.

use std::time::Duration;

use nng::options::protocol::pubsub::{Subscribe, Unsubscribe};
use nng::options::{Options, RecvMaxSize, RecvTimeout};
use nng::{Protocol, Socket};

use changecast_proto::framing::{decode_frame, topic_prefix, MAX_MESSAGE_SIZE};
use changecast_proto::{BroadcastMessage, GroupName};

use crate::error::Error;

/// Receives broadcasts for the groups it has joined.
pub struct GroupSubscriber {
    socket: Socket,
}

impl GroupSubscriber {
    /// Connect to a publisher at `address`.
    pub fn connect(address: &str) -> Result<Self, Error> {
        let socket = Socket::new(Protocol::Sub0)
            .map_err(|e| Error::Transport(format!("failed to create socket: {}", e)))?;

        socket
            .set_opt::<RecvMaxSize>(MAX_MESSAGE_SIZE)
            .map_err(|e| Error::Transport(format!("failed to set max message size: {}", e)))?;

        socket
            .dial(address)
            .map_err(|e| Error::Transport(format!("failed to connect to {}: {}", address, e)))?;

        tracing::debug!(address, "subscriber connected");
        Ok(Self { socket })
    }

    /// Join a group.
    pub fn join(&self, group: &GroupName) -> Result<(), Error> {
        self.socket
            .set_opt::<Subscribe>(topic_prefix(group))
            .map_err(|e| Error::Transport(format!("failed to join {}: {}", group, e)))
    }

    /// Leave a group.
    pub fn leave(&self, group: &GroupName) -> Result<(), Error> {
        self.socket
            .set_opt::<Unsubscribe>(topic_prefix(group))
            .map_err(|e| Error::Transport(format!("failed to leave {}: {}", group, e)))
    }

    /// Wait up to `timeout` for the next broadcast.
    ///
    /// Returns `Ok(None)` when nothing arrives in time.
    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> Result<Option<(GroupName, BroadcastMessage)>, Error> {
        self.socket
            .set_opt::<RecvTimeout>(Some(timeout))
            .map_err(|e| Error::Transport(format!("failed to set receive timeout: {}", e)))?;

        match self.socket.recv() {
            Ok(msg) => Ok(Some(decode_frame(msg.as_slice())?)),
            Err(nng::Error::TimedOut) => Ok(None),
            Err(e) => Err(Error::Transport(format!("receive error: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::Publisher;
    use changecast_core::GroupTransport;
    use serde_json::json;

    /// Publish until the subscriber sees a frame; dialing completes in the
    /// background so the first frames can be missed.
    async fn publish_until_received(
        publisher: &Publisher,
        subscriber: &GroupSubscriber,
        group: &GroupName,
        message: &BroadcastMessage,
    ) -> Option<(GroupName, BroadcastMessage)> {
        for _ in 0..50 {
            publisher.group_send(group, message.clone()).await.unwrap();
            if let Some(received) = subscriber
                .recv_timeout(Duration::from_millis(20))
                .unwrap()
            {
                return Some(received);
            }
        }
        None
    }

    #[tokio::test]
    async fn test_joined_group_receives_broadcast() {
        let address = "inproc://subscriber-joined";
        let publisher = Publisher::bind(&[address.to_string()], MAX_MESSAGE_SIZE).unwrap();
        let subscriber = GroupSubscriber::connect(address).unwrap();
        let group = GroupName::raw("abc");
        subscriber.join(&group).unwrap();

        let message = BroadcastMessage::error(json!({"server_rev": 3}));
        let received = publish_until_received(&publisher, &subscriber, &group, &message).await;

        assert_eq!(received, Some((group, message)));
    }

    #[tokio::test]
    async fn test_prefix_group_is_not_joined() {
        let address = "inproc://subscriber-prefix";
        let publisher = Publisher::bind(&[address.to_string()], MAX_MESSAGE_SIZE).unwrap();
        let subscriber = GroupSubscriber::connect(address).unwrap();
        subscriber.join(&GroupName::raw("ab")).unwrap();
        subscriber.join(&GroupName::raw("marker")).unwrap();

        // Wait until the connection delivers frames at all.
        let marker = BroadcastMessage::change(json!("marker"));
        assert!(
            publish_until_received(&publisher, &subscriber, &GroupName::raw("marker"), &marker)
                .await
                .is_some()
        );
        while subscriber
            .recv_timeout(Duration::from_millis(20))
            .unwrap()
            .is_some()
        {}

        publisher
            .group_send(&GroupName::raw("abc"), BroadcastMessage::change(json!(1)))
            .await
            .unwrap();

        assert!(subscriber
            .recv_timeout(Duration::from_millis(50))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_recv_times_out() {
        let address = "inproc://subscriber-timeout";
        let _publisher = Publisher::bind(&[address.to_string()], MAX_MESSAGE_SIZE).unwrap();
        let subscriber = GroupSubscriber::connect(address).unwrap();

        assert!(subscriber
            .recv_timeout(Duration::from_millis(10))
            .unwrap()
            .is_none());
    }
}
