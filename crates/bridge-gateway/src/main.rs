//! Process entrypoint: constructs every long-lived singleton, wires them
//! by reference, and tears them down in reverse dependency order on
//! shutdown (spec §9 Ownership & lifetimes).

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

mod app;
mod http;

use bridge_agent::EchoAgentInvoker;
use bridge_archive::ArchiveStore;
use bridge_core::config::BridgeConfig;
use bridge_deadletter::DeadLetterStore;
use bridge_delivery::DeliveryService;
use bridge_enrichment::{EnrichmentStage, NoopLinkSummaryProvider, NoopMediaProvider, NoopYoutubeProvider};
use bridge_ingest::IngestHandler;
use bridge_kv::{HistoryMirror, KvStore, Namespace, PubSub, RetentionSweeper};
use bridge_mcp::{McpConfig, McpOrchestrator};
use bridge_queue::{JobQueue, QueueConfig};
use bridge_sessions::{KeywordClassifier, SessionRegistry};
use bridge_telegram::TelegramTransport;
use bridge_transport::Transport;
use bridge_watchdog::{Watchdog, WatchdogConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bridge_gateway=info".into()),
        )
        .init();

    let config_path = std::env::var("BRIDGE_CONFIG").ok();
    let config = BridgeConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("config load failed ({e}), using defaults");
        BridgeConfig::default()
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // --- Supporting infrastructure, leaves first. ---
    let kv = KvStore::connect(&config.kv.url, Namespace::from_config(&config.kv_namespace)).await?;
    let pubsub = PubSub::new();
    let sqlite = rusqlite::Connection::open(&config.database.path)?;
    let archive = Arc::new(ArchiveStore::new(sqlite, Some(pubsub.clone()))?);
    let dead_letters = DeadLetterStore::new(kv.clone());

    // --- Transport. ---
    let bot_token = std::env::var("BRIDGE_TELEGRAM_BOT_TOKEN").unwrap_or_default();
    let transport: Arc<dyn Transport> = Arc::new(TelegramTransport::new(bot_token));

    // --- Core pipeline, each owning exactly the state spec §3 assigns it. ---
    let sessions = Arc::new(SessionRegistry::new(
        kv.clone(),
        Arc::new(KeywordClassifier),
        config.silence_threshold_seconds,
    ));

    let enrichment = Arc::new(EnrichmentStage::new(
        Arc::new(NoopMediaProvider),
        Arc::new(NoopYoutubeProvider),
        Arc::new(NoopLinkSummaryProvider),
        transport.clone(),
        std::time::Duration::from_secs(config.enrichment_timeout_seconds / 4),
        std::time::Duration::from_secs(config.enrichment_timeout_seconds),
    ));

    let delivery = Arc::new(
        DeliveryService::new(
            transport.clone(),
            dead_letters,
            config.max_chunk_chars,
            config.delivery_retry_max,
        )
        .with_archive(archive.clone()),
    );

    let logs_dir = std::path::PathBuf::from(&config.logs_dir);
    let queue = Arc::new(JobQueue::new_with_archive(
        QueueConfig {
            worker_concurrency: config.worker_concurrency,
            default_project_key: config.default_project_key.clone(),
            logs_dir: logs_dir.clone(),
            reenrich_on_replay: config.reenrich_on_replay,
            shutdown_grace: std::time::Duration::from_secs(config.shutdown_grace_seconds),
        },
        enrichment,
        Arc::new(EchoAgentInvoker),
        sessions.clone(),
        delivery.clone(),
        Some(archive.clone()),
    ));

    let ingest = Arc::new(IngestHandler::new(queue.clone(), None));

    // --- Watchdog and MCP orchestrator: read-only observers, wired last. ---
    let watchdog = Arc::new(Watchdog::new(
        sessions.clone(),
        transport.clone(),
        WatchdogConfig {
            interval_seconds: config.watchdog_interval_seconds,
            silence_threshold_seconds: config.silence_threshold_seconds,
            duration_threshold_seconds: config.duration_threshold_seconds,
            loop_threshold: config.loop_threshold,
            error_cascade_threshold: config.error_cascade_threshold,
            error_cascade_window: config.error_cascade_window,
            alert_cooldown_seconds: config.alert_cooldown_seconds,
            logs_dir,
        },
    ));

    let mcp = Arc::new(McpOrchestrator::new(McpConfig {
        health_check_interval_seconds: config.mcp_health_check_interval_seconds,
        enable_inter_server_messaging: config.mcp_enable_inter_server_messaging,
        enable_load_balancing: config.mcp_enable_load_balancing,
        message_processing_interval_seconds: 1,
        health_check_timeout_seconds: 10,
    }));

    // --- Replay pending dead letters before accepting new traffic. ---
    if let Err(e) = delivery.replay().await {
        warn!(error = %e, "dead-letter replay failed at startup");
    }

    // --- Register the transport's inbound callback and connect. ---
    {
        let ingest = ingest.clone();
        transport.on_message(Arc::new(move |event: bridge_transport::InboundEvent| {
            let ingest = ingest.clone();
            Box::pin(async move {
                ingest
                    .handle(bridge_ingest::RawEvent {
                        chat_id: event.chat_id,
                        message_id: event.message_id,
                        sender: event.sender,
                        text: event.text,
                        has_media: event.has_media,
                        reply_to: event.reply_to,
                        timestamp: event.timestamp,
                    })
                    .await;
            }) as std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>
        }));
    }
    transport.connect().await?;

    // --- Background loops, each observing the shared shutdown signal. ---
    let watchdog_handle = tokio::spawn(watchdog.clone().run(shutdown_rx.clone()));
    let mcp_health_handle = tokio::spawn(mcp.clone().run_health_check_loop(shutdown_rx.clone()));
    let mcp_messages_handle = tokio::spawn(mcp.clone().run_message_processor_loop(shutdown_rx.clone()));
    let history_mirror_handle = tokio::spawn(
        HistoryMirror::new(kv.clone(), pubsub.clone()).run(shutdown_rx.clone()),
    );
    let retention_handle = tokio::spawn(
        RetentionSweeper::new(
            kv.clone(),
            std::time::Duration::from_secs(config.bridge_event_sweep_interval_seconds),
            config.bridge_event_retention_seconds as f64,
        )
        .run(shutdown_rx.clone()),
    );

    // --- Liveness endpoint. ---
    let state = Arc::new(app::AppState {
        sessions: sessions.clone(),
        mcp: mcp.clone(),
    });
    let router = app::build_router(state);
    let addr: SocketAddr = "0.0.0.0:8080".parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "bridge gateway listening");
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            warn!(error = %e, "health server exited");
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, tearing down");

    // Reverse dependency order: stop producing new work before the things
    // that consume it go away.
    let _ = shutdown_tx.send(true);
    transport.disconnect().await?;
    queue.shutdown().await;
    let _ = watchdog_handle.await;
    let _ = mcp_health_handle.await;
    let _ = mcp_messages_handle.await;
    let _ = history_mirror_handle.await;
    let _ = retention_handle.await;
    server.abort();

    info!("shutdown complete");
    Ok(())
}
