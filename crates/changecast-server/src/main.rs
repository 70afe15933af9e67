//! changecast server - broadcasts committed changes to subscriber groups.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use changecast_core::{cdc, BroadcastRouter};
use changecast_server::{create_publisher, Args, Ingest};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "changecast_server=info,changecast_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting changecast server");

    // Parse command-line arguments
    let args = Args::parse();
    let config = args.into_config();

    tracing::info!(
        publish_tcp = ?config.publish_tcp,
        publish_ipc = ?config.publish_ipc,
        ingest = %config.ingest_address,
        audience_policy = ?config.audience_policy,
        strict = config.strict,
        "configuration loaded"
    );

    // Router publishing to subscribers
    let publisher = create_publisher(&config)?;
    let router = Arc::new(BroadcastRouter::with_config(
        publisher,
        config.router_config(),
    ));

    // Change processor fed by the ingest socket
    let handle = cdc::start_processor(router.clone(), config.buffer_size);
    let ingest = Ingest::new(&config, handle)?;

    // Set up graceful shutdown
    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);

    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl+c");
            return;
        }
        tracing::info!("received shutdown signal");
        let _ = shutdown_tx_clone.send(());
    });

    tracing::info!("server ready, accepting change events");
    if let Err(e) = ingest.run_until_shutdown(shutdown_rx).await {
        tracing::error!(error = %e, "server error");
        return Err(e.into());
    }

    let metrics = router.metrics();
    let publisher = router.transport().metrics();
    tracing::info!(
        events_routed = metrics.routed_events(),
        changes_sent = metrics.sent_changes(),
        errors_sent = metrics.sent_errors(),
        send_failures = metrics.failed_sends(),
        malformed_events = metrics.rejected_events(),
        frames_sent = publisher.sent_frames(),
        bytes_sent = publisher.total_bytes_sent(),
        uptime_secs = metrics.uptime().as_secs(),
        "server shutdown complete"
    );

    Ok(())
}
