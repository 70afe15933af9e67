//! End-to-end test: ingest socket, router, publisher, subscriber.

use std::sync::Arc;
use std::time::Duration;

use nng::{Message, Protocol, Socket};
use serde_json::json;

use changecast_core::{cdc, AudiencePolicy, BroadcastRouter};
use changecast_proto::{BroadcastMessage, ChangeEvent, GroupName};
use changecast_server::{create_publisher, GroupSubscriber, Ingest, ServerConfig};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pushed_change_reaches_subscribers() {
    let publish_address = "inproc://pipeline-publish";
    let ingest_address = "inproc://pipeline-ingest";

    let config = ServerConfig::new()
        .without_tcp()
        .with_publish_ipc(publish_address)
        .with_ingest_address(ingest_address)
        .with_audience_policy(AudiencePolicy::Placeholder)
        .with_strict(false);

    let router = Arc::new(BroadcastRouter::with_config(
        create_publisher(&config).unwrap(),
        config.router_config(),
    ));
    let handle = cdc::start_processor(router.clone(), config.buffer_size);
    let ingest = Ingest::new(&config, handle).unwrap();

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    let server = tokio::spawn(async move { ingest.run_until_shutdown(shutdown_rx).await });

    let author = GroupSubscriber::connect(publish_address).unwrap();
    author.join(&GroupName::raw("7")).unwrap();

    let push = Socket::new(Protocol::Push0).unwrap();
    push.dial(ingest_address).unwrap();

    let event = ChangeEvent::new(json!({"server_rev": 99}))
        .with_channel("abc")
        .created_by("7")
        .with_errored(true);
    let body = serde_json::to_vec(&event).unwrap();

    // Connections settle in the background; resend until a frame arrives.
    let mut received = None;
    for _ in 0..50 {
        push.send(Message::from(body.as_slice()))
            .map_err(|(_, e)| e)
            .unwrap();
        if let Some(frame) = author.recv_timeout(Duration::from_millis(50)).unwrap() {
            received = Some(frame);
            break;
        }
    }

    let (group, message) = received.expect("author never received the error broadcast");
    assert_eq!(group, GroupName::raw("7"));
    assert_eq!(message, BroadcastMessage::error(json!({"server_rev": 99})));

    shutdown_tx.send(()).unwrap();
    server.await.unwrap().unwrap();
}
