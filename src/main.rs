//! UGENT WeChat Recall - Main Entry Point
//!
//! 1. Wipes and opens the content store (a store failure is fatal)
//! 2. Receives group message events from the WeChat bridge
//! 3. Republishes recalled messages and images to the audit group

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ugent_wechat_recall::forwarder::NotificationForwarder;
use ugent_wechat_recall::session::{DestinationStrategy, SessionContext};
use ugent_wechat_recall::webhook::{self, WebhookState};
use ugent_wechat_recall::{BridgeClient, ContentStore, EventClassifier, RecallWorker, RelayConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,ugent_wechat_recall=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 UGENT WeChat Recall starting...");

    // Load configuration
    let config = RelayConfig::from_env()?;
    info!(
        "📋 Monitoring '{}', retention {} min",
        config.monitored_group, config.retention_minutes
    );
    match &config.destination {
        DestinationStrategy::Static { group } => info!("📋 Destination group: {}", group),
        DestinationStrategy::DiscoverOnKeyword {
            trigger_sender,
            keyword,
        } => info!(
            "📋 Destination pending: waiting for {} to post '{}'",
            trigger_sender, keyword
        ),
    }

    // Recall recovery never spans a restart
    if config.wipe_on_startup {
        match ContentStore::wipe(&config.storage_path) {
            Ok(true) => info!("🗑️ Removed previous store {:?}", config.storage_path),
            Ok(false) => debug!("No previous store at {:?}", config.storage_path),
            Err(e) => warn!("Failed to remove previous store: {}", e),
        }
    }

    let store = Arc::new(
        ContentStore::open(&config.storage_path).context("Failed to initialize content store")?,
    );
    info!("📦 Storage initialized at {:?}", config.storage_path);

    // Create shared state
    let bridge = Arc::new(BridgeClient::new(
        &config.bridge_api_url,
        config.bridge_token.clone(),
    )?);
    let session = Arc::new(SessionContext::new(config.destination.clone()));
    let (events_tx, events_rx) = mpsc::channel(config.event_queue_capacity);

    // Spawn recall worker
    let forwarder = NotificationForwarder::new(bridge.clone(), session.clone());
    let worker = RecallWorker::new(store.clone(), config.retention(), forwarder)
        .with_sweep_interval(config.sweep_interval());
    let worker_task = tokio::spawn(worker.run(events_rx));

    // Spawn webhook server
    let webhook_addr: SocketAddr = config.webhook_addr.parse()?;
    let state = WebhookState {
        classifier: EventClassifier::new(config.monitored_group.clone(), bridge),
        session,
        store,
        events: events_tx,
        token: config.bridge_token.clone(),
        debug_mode: config.debug_mode,
    };
    let webhook_server = spawn_webhook_server(webhook_addr, state);

    info!("🌐 Bridge webhook listening on {}", config.webhook_addr);

    // Wait for shutdown signal
    match signal::ctrl_c().await {
        Ok(()) => info!("📢 Shutdown signal received"),
        Err(err) => tracing::error!("Unable to listen for shutdown signal: {}", err),
    }

    // Graceful shutdown: stopping the server drops the queue sender
    info!("🛑 Shutting down...");
    webhook_server.abort();
    if tokio::time::timeout(Duration::from_secs(5), worker_task)
        .await
        .is_err()
    {
        warn!("Recall worker did not drain in time");
    }

    info!("✅ UGENT WeChat Recall stopped");
    Ok(())
}

/// Spawn the bridge webhook HTTP server
fn spawn_webhook_server(addr: SocketAddr, state: WebhookState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = webhook::run_server(addr, state).await {
            tracing::error!("Webhook server error: {}", e);
        }
    })
}
