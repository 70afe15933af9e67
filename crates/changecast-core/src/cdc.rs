//! Change processing.
//!
//! The persistence layer submits one [`ChangeEvent`] per committed change
//! through a [`ChangeHandle`]. A background [`ChangeProcessor`] routes each
//! event. A failed route is logged and counted; the processor never retries
//! and moves on to the next event.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use changecast_proto::ChangeEvent;

use crate::error::Error;
use crate::router::BroadcastRouter;
use crate::serializer::{build_event, ChangeRecord, ChangeSerializer};
use crate::transport::GroupTransport;

/// Default buffer size of the change channel.
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Bridges submitted change events to the broadcast router.
pub struct ChangeProcessor<T> {
    /// Receiver for change events.
    rx: mpsc::Receiver<ChangeEvent>,
    /// Router for event distribution.
    router: Arc<BroadcastRouter<T>>,
    /// Number of events whose routing failed.
    failures: Arc<AtomicU64>,
}

impl<T: GroupTransport + 'static> ChangeProcessor<T> {
    /// Create a new change processor.
    pub fn new(rx: mpsc::Receiver<ChangeEvent>, router: Arc<BroadcastRouter<T>>) -> Self {
        Self {
            rx,
            router,
            failures: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Counter of failed routes, readable while the processor runs.
    pub fn failure_counter(&self) -> Arc<AtomicU64> {
        self.failures.clone()
    }

    /// Run the processor until every sender is dropped.
    pub async fn run(mut self) {
        info!("change processor started");

        while let Some(event) = self.rx.recv().await {
            self.process_event(&event).await;
        }

        info!(
            failures = self.failures.load(Ordering::Relaxed),
            "change processor stopped (channel closed)"
        );
    }

    async fn process_event(&self, event: &ChangeEvent) {
        debug!(
            channel_id = ?event.channel_id,
            user_id = ?event.user_id,
            errored = event.errored,
            "processing change event"
        );

        if let Err(e) = self.router.route(event).await {
            self.failures.fetch_add(1, Ordering::Relaxed);
            error!(
                error = %e,
                channel_id = ?event.channel_id,
                user_id = ?event.user_id,
                "failed to broadcast change"
            );
        }
    }
}

/// Change channel sender.
pub type ChangeSender = mpsc::Sender<ChangeEvent>;

/// Change channel receiver.
pub type ChangeReceiver = mpsc::Receiver<ChangeEvent>;

/// Create a new change channel with the given buffer size.
pub fn channel(buffer_size: usize) -> (ChangeSender, ChangeReceiver) {
    mpsc::channel(buffer_size.max(1))
}

/// Handle for submitting committed changes to a running processor.
#[derive(Clone)]
pub struct ChangeHandle {
    tx: ChangeSender,
}

impl ChangeHandle {
    /// Create a new change handle.
    pub fn new(tx: ChangeSender) -> Self {
        Self { tx }
    }

    /// Submit an event without waiting; fails if the channel is full.
    pub fn try_send(&self, event: ChangeEvent) -> Result<(), Error> {
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                Error::Transport("change channel is full".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => {
                Error::Transport("change processor has stopped".to_string())
            }
        })
    }

    /// Submit an event, waiting if the channel is full.
    pub async fn send(&self, event: ChangeEvent) -> Result<(), Error> {
        self.tx
            .send(event)
            .await
            .map_err(|_| Error::Transport("change processor has stopped".to_string()))
    }

    /// Build the event for a committed record and submit it.
    pub async fn notify_committed<R, S>(&self, record: &R, serializer: &S) -> Result<(), Error>
    where
        R: ChangeRecord + ?Sized,
        S: ChangeSerializer<R> + ?Sized,
    {
        let event = build_event(record, serializer)?;
        self.send(event).await
    }

    /// Clone the sender for use in another context.
    pub fn clone_sender(&self) -> ChangeSender {
        self.tx.clone()
    }
}

/// Start a change processor and return a handle for submitting events.
///
/// This spawns a background task on the current tokio runtime.
pub fn start_processor<T>(router: Arc<BroadcastRouter<T>>, buffer_size: usize) -> ChangeHandle
where
    T: GroupTransport + 'static,
{
    let (tx, rx) = channel(buffer_size);
    let processor = ChangeProcessor::new(rx, router);

    tokio::spawn(async move {
        processor.run().await;
    });

    ChangeHandle::new(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::RouterConfig;
    use crate::serializer::JsonSerializer;
    use crate::transport::testing::RecordingTransport;
    use serde::Serialize;
    use serde_json::json;

    fn test_router(transport: RecordingTransport) -> Arc<BroadcastRouter<RecordingTransport>> {
        Arc::new(BroadcastRouter::with_config(
            transport,
            RouterConfig::new().with_strict(false),
        ))
    }

    #[tokio::test]
    async fn test_processor_routes_events() {
        let router = test_router(RecordingTransport::new());
        let (tx, rx) = channel(10);

        let processor = ChangeProcessor::new(rx, router.clone());
        let handle = tokio::spawn(processor.run());

        tx.send(ChangeEvent::new(json!(1)).with_channel("abc").with_user("u1"))
            .await
            .unwrap();
        drop(tx);

        // Run returns once the channel closes and the queue is drained.
        handle.await.unwrap();

        assert_eq!(router.transport().destinations(), vec!["abc", "u1"]);
    }

    #[tokio::test]
    async fn test_processor_survives_route_failure() {
        let router = test_router(RecordingTransport::failing_on(0));
        let (tx, rx) = channel(10);

        let processor = ChangeProcessor::new(rx, router.clone());
        let failures = processor.failure_counter();
        let handle = tokio::spawn(processor.run());

        tx.send(ChangeEvent::new(json!(1)).with_channel("abc").with_user("u1"))
            .await
            .unwrap();
        tx.send(ChangeEvent::new(json!(2)).with_channel("def").with_user("u2"))
            .await
            .unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(failures.load(Ordering::Relaxed), 1);
        assert_eq!(router.transport().destinations(), vec!["def", "u2"]);
    }

    #[tokio::test]
    async fn test_handle_try_send_full() {
        let (tx, _rx) = channel(1);
        let handle = ChangeHandle::new(tx);

        assert!(handle.try_send(ChangeEvent::new(json!(1))).is_ok());
        assert!(matches!(
            handle.try_send(ChangeEvent::new(json!(2))),
            Err(Error::Transport(msg)) if msg.contains("full")
        ));
    }

    #[tokio::test]
    async fn test_handle_after_processor_stops() {
        let (tx, rx) = channel(1);
        drop(rx);
        let handle = ChangeHandle::new(tx);

        assert!(handle.send(ChangeEvent::new(json!(1))).await.is_err());
    }

    #[derive(Serialize)]
    struct Change {
        channel_id: String,
        created_by_id: u64,
        errored: bool,
    }

    impl ChangeRecord for Change {
        fn channel_id(&self) -> Option<String> {
            Some(self.channel_id.clone())
        }

        fn user_id(&self) -> Option<String> {
            None
        }

        fn created_by_id(&self) -> Option<String> {
            Some(self.created_by_id.to_string())
        }

        fn errored(&self) -> bool {
            self.errored
        }
    }

    #[tokio::test]
    async fn test_notify_committed() {
        let (tx, mut rx) = channel(4);
        let handle = ChangeHandle::new(tx);
        let change = Change {
            channel_id: "abc".to_string(),
            created_by_id: 9,
            errored: true,
        };

        handle.notify_committed(&change, &JsonSerializer).await.unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.channel_id.as_deref(), Some("abc"));
        assert_eq!(event.created_by_id.as_deref(), Some("9"));
        assert!(event.errored);
        assert_eq!(event.payload["created_by_id"], json!(9));
    }

    #[tokio::test]
    async fn test_start_processor() {
        let router = test_router(RecordingTransport::new());
        let handle = start_processor(router.clone(), 8);

        handle
            .send(ChangeEvent::new(json!(1)).created_by("7").with_errored(true))
            .await
            .unwrap();

        // The processor runs on its own task; wait for it to catch up.
        for _ in 0..100 {
            if router.transport().sent().len() == 3 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        assert_eq!(
            router.transport().destinations(),
            vec!["7", "dummy", "dummy"]
        );
    }
}
