//! Group transport over an NNG PUB socket.
//!
//! Every group send becomes one topic-prefixed frame (see
//! [`changecast_proto::framing`]). Subscribers join a group by subscribing to
//! its topic prefix, so membership lives in the subscribers, not here.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use nng::{Message, Protocol, Socket};

use changecast_core::GroupTransport;
use changecast_proto::framing::encode_frame;
use changecast_proto::{BroadcastMessage, GroupName};

use crate::config::ServerConfig;
use crate::error::Error;

/// Publisher metrics for monitoring.
#[derive(Debug)]
pub struct PublisherMetrics {
    /// Frames handed to the socket.
    pub frames_sent: AtomicU64,
    /// Frames the socket refused.
    pub frames_failed: AtomicU64,
    /// Bytes handed to the socket.
    pub bytes_sent: AtomicU64,
    /// Publisher start time.
    pub started_at: Instant,
}

impl PublisherMetrics {
    fn new() -> Self {
        Self {
            frames_sent: AtomicU64::new(0),
            frames_failed: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    fn record_success(&self, bytes: usize) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.frames_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the uptime duration.
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Get the number of frames sent.
    pub fn sent_frames(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    /// Get the number of frames that failed to send.
    pub fn failed_frames(&self) -> u64 {
        self.frames_failed.load(Ordering::Relaxed)
    }

    /// Get total bytes sent.
    pub fn total_bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }
}

/// Publishes group broadcasts on an NNG PUB socket.
pub struct Publisher {
    socket: Socket,
    max_message_size: usize,
    metrics: PublisherMetrics,
}

impl Publisher {
    /// Create a publisher listening on the configured addresses.
    pub fn new(config: &ServerConfig) -> Result<Self, Error> {
        let mut addresses = Vec::new();
        addresses.extend(config.publish_tcp.iter().cloned());
        addresses.extend(config.publish_ipc.iter().cloned());
        Self::bind(&addresses, config.max_message_size)
    }

    /// Create a publisher listening on the given addresses.
    pub fn bind(addresses: &[String], max_message_size: usize) -> Result<Self, Error> {
        let socket = Socket::new(Protocol::Pub0)
            .map_err(|e| Error::Transport(format!("failed to create socket: {}", e)))?;

        for address in addresses {
            socket.listen(address).map_err(|e| {
                Error::Transport(format!("failed to listen on {}: {}", address, e))
            })?;
            tracing::info!(address = %address, "publishing on");
        }

        Ok(Self {
            socket,
            max_message_size,
            metrics: PublisherMetrics::new(),
        })
    }

    /// Get a reference to the publisher metrics.
    pub fn metrics(&self) -> &PublisherMetrics {
        &self.metrics
    }

    /// Encode and publish one frame.
    fn publish(
        &self,
        destination: &GroupName,
        message: &BroadcastMessage,
    ) -> Result<(), changecast_core::Error> {
        let frame = encode_frame(destination, message)?;
        if frame.len() > self.max_message_size {
            return Err(changecast_core::Error::Transport(format!(
                "frame for {} is {} bytes (max: {})",
                destination,
                frame.len(),
                self.max_message_size
            )));
        }

        let size = frame.len();
        match self.socket.send(Message::from(frame.as_slice())) {
            Ok(()) => {
                self.metrics.record_success(size);
                tracing::trace!(group = %destination, bytes = size, "frame published");
                Ok(())
            }
            Err((_, e)) => {
                self.metrics.record_failure();
                Err(changecast_core::Error::Transport(format!(
                    "failed to publish to {}: {}",
                    destination, e
                )))
            }
        }
    }
}

impl GroupTransport for Publisher {
    async fn group_send(
        &self,
        destination: &GroupName,
        message: BroadcastMessage,
    ) -> Result<(), changecast_core::Error> {
        self.publish(destination, &message)
    }
}

/// Create a publisher for the configured addresses.
pub fn create_publisher(config: &ServerConfig) -> Result<Publisher, Error> {
    if !config.has_publish_address() {
        return Err(Error::Config(
            "no publish address configured (need TCP or IPC address)".to_string(),
        ));
    }

    Publisher::new(config)
}
