//! Change event intake over an NNG PULL socket.
//!
//! The persistence layer pushes one JSON [`ChangeEvent`] per committed change.
//! A worker thread decodes each message and submits it to the change
//! processor. Messages that fail to decode are logged and dropped.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use nng::options::{Options, RecvMaxSize, RecvTimeout};
use nng::{Protocol, Socket};

use changecast_core::cdc::ChangeSender;
use changecast_core::ChangeHandle;
use changecast_proto::ChangeEvent;

use crate::config::ServerConfig;
use crate::error::Error;

/// How long a receive waits before rechecking the stop flag.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// First pause after a failed receive.
const INITIAL_BACKOFF: Duration = Duration::from_millis(10);

/// Longest pause between failed receives.
const MAX_BACKOFF: Duration = Duration::from_secs(1);

/// Pause to take after a failed receive, doubling up to [`MAX_BACKOFF`].
fn next_backoff(current: Option<Duration>) -> Duration {
    match current {
        None => INITIAL_BACKOFF,
        Some(current) => (current * 2).min(MAX_BACKOFF),
    }
}

/// Ingest metrics for monitoring.
#[derive(Debug, Default)]
pub struct IngestMetrics {
    /// Messages received from the socket.
    pub received: AtomicU64,
    /// Events handed to the processor.
    pub accepted: AtomicU64,
    /// Messages that failed to decode.
    pub rejected: AtomicU64,
}

impl IngestMetrics {
    /// Get the number of received messages.
    pub fn received_messages(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Get the number of accepted events.
    pub fn accepted_events(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    /// Get the number of rejected messages.
    pub fn rejected_messages(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

/// Receives change events pushed by the persistence layer.
pub struct Ingest {
    socket: Socket,
    handle: ChangeHandle,
    max_message_size: usize,
    metrics: Arc<IngestMetrics>,
}

impl Ingest {
    /// Create an ingest socket listening on the configured address.
    pub fn new(config: &ServerConfig, handle: ChangeHandle) -> Result<Self, Error> {
        let socket = Socket::new(Protocol::Pull0)
            .map_err(|e| Error::Transport(format!("failed to create socket: {}", e)))?;

        socket
            .set_opt::<RecvMaxSize>(config.max_message_size)
            .map_err(|e| Error::Transport(format!("failed to set max message size: {}", e)))?;
        socket
            .set_opt::<RecvTimeout>(Some(POLL_INTERVAL))
            .map_err(|e| Error::Transport(format!("failed to set receive timeout: {}", e)))?;

        socket.listen(&config.ingest_address).map_err(|e| {
            Error::Transport(format!(
                "failed to listen on {}: {}",
                config.ingest_address, e
            ))
        })?;
        tracing::info!(address = %config.ingest_address, "accepting change events");

        Ok(Self {
            socket,
            handle,
            max_message_size: config.max_message_size,
            metrics: Arc::new(IngestMetrics::default()),
        })
    }

    /// Get a reference to the ingest metrics.
    pub fn metrics(&self) -> &IngestMetrics {
        &self.metrics
    }

    /// Run the ingest loop until a shutdown signal arrives.
    pub async fn run_until_shutdown(
        &self,
        mut shutdown: tokio::sync::broadcast::Receiver<()>,
    ) -> Result<(), Error> {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let worker = self.spawn_worker(stop_flag.clone())?;

        let _ = shutdown.recv().await;
        tracing::info!(
            received = self.metrics.received_messages(),
            accepted = self.metrics.accepted_events(),
            rejected = self.metrics.rejected_messages(),
            "shutdown signal received, stopping ingest"
        );

        stop_flag.store(true, Ordering::SeqCst);
        match tokio::task::spawn_blocking(move || worker.join()).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => tracing::error!("ingest worker panicked"),
            Err(e) => tracing::error!(error = %e, "failed to join ingest worker"),
        }

        Ok(())
    }

    fn spawn_worker(&self, stop_flag: Arc<AtomicBool>) -> Result<thread::JoinHandle<()>, Error> {
        let socket = self.socket.clone();
        let worker = IngestWorker {
            sender: self.handle.clone_sender(),
            max_message_size: self.max_message_size,
            metrics: self.metrics.clone(),
        };

        thread::Builder::new()
            .name("changecast-ingest".to_string())
            .spawn(move || {
                let mut backoff = None;
                loop {
                    if stop_flag.load(Ordering::SeqCst) {
                        tracing::info!("ingest worker stopping");
                        return;
                    }

                    match socket.recv() {
                        Ok(msg) => {
                            backoff = None;
                            if !worker.process_message(msg.as_slice()) {
                                tracing::info!("change processor stopped, ingest worker exiting");
                                return;
                            }
                        }
                        Err(nng::Error::TimedOut) => backoff = None,
                        Err(e) => {
                            let pause = next_backoff(backoff);
                            if backoff.is_none() {
                                tracing::error!(error = %e, "receive error");
                            } else {
                                tracing::debug!(error = %e, retry_in = ?pause, "receive error");
                            }
                            backoff = Some(pause);
                            thread::sleep(pause);
                        }
                    }
                }
            })
            .map_err(|e| Error::Transport(format!("failed to spawn ingest worker: {}", e)))
    }
}

struct IngestWorker {
    sender: ChangeSender,
    max_message_size: usize,
    metrics: Arc<IngestMetrics>,
}

impl IngestWorker {
    /// Decode and forward one message. Returns false once the processor is gone.
    fn process_message(&self, data: &[u8]) -> bool {
        self.metrics.received.fetch_add(1, Ordering::Relaxed);

        let event = match self.decode(data) {
            Ok(event) => event,
            Err(e) => {
                self.metrics.rejected.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, bytes = data.len(), "dropping undecodable change event");
                return true;
            }
        };

        if self.sender.blocking_send(event).is_err() {
            return false;
        }
        self.metrics.accepted.fetch_add(1, Ordering::Relaxed);
        true
    }

    fn decode(&self, data: &[u8]) -> Result<ChangeEvent, Error> {
        if data.len() > self.max_message_size {
            return Err(Error::Protocol(changecast_proto::Error::InvalidMessage(
                format!(
                    "message too large: {} bytes (max: {})",
                    data.len(),
                    self.max_message_size
                ),
            )));
        }

        serde_json::from_slice(data).map_err(|e| {
            Error::Protocol(changecast_proto::Error::Deserialization(format!(
                "failed to decode change event: {}",
                e
            )))
        })
    }
}
