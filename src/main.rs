//! Swap Settlement Service - Entry Point
//!
//! Initializes configuration, logging and the HTTP adapters, wires the
//! orchestrator and serves the swap API. Runs until SIGINT.
//!
//! Wiring sequence:
//! 1. Load config.toml + validate
//! 2. Init tracing (JSON structured logging)
//! 3. Load API credentials from env vars (SWAP_API_KEY, SWAP_API_SECRET)
//! 4. Create ApiClients (HTTP + signing + retry + rate limit)
//! 5. Create HttpLedgerGateway + HttpSwapBackend (port adapters)
//! 6. Build event bus, job store, precheck, reconciler, monitor, submitter
//! 7. Restore job history from disk
//! 8. Spawn metrics observer, notification log, retention sweep
//! 9. Spawn swap API server (/swaps, /live, /ready, /metrics)
//! 10. Wait for SIGINT → graceful shutdown (drain→stop monitors→save→exit)

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{error, info, warn};

use swap_settlement::adapters::api::auth::ApiAuth;
use swap_settlement::adapters::api::{ApiClient, ApiClientConfig, HttpLedgerGateway, HttpSwapBackend};
use swap_settlement::adapters::metrics::{HealthState, MetricsRegistry};
use swap_settlement::adapters::persistence::HistoryStore;
use swap_settlement::adapters::server::{self, AppState};
use swap_settlement::config;
use swap_settlement::domain::token::TokenCatalog;
use swap_settlement::ports::backend::SwapBackend;
use swap_settlement::ports::clock::{Clock, SystemClock};
use swap_settlement::ports::ledger::LedgerGateway;
use swap_settlement::usecases::allowance::AllowancePrecheck;
use swap_settlement::usecases::events::{EventBus, NotificationLevel, SwapEvent};
use swap_settlement::usecases::job_store::SwapJobStore;
use swap_settlement::usecases::monitor::SettlementMonitor;
use swap_settlement::usecases::reconciler::BalanceReconciler;
use swap_settlement::usecases::submitter::SwapSubmitter;

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration from config.toml ──────────────
    let config = config::loader::load_config("config.toml")
        .context("Failed to load configuration")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    tracing_subscriber::EnvFilter::new(&config.service.log_level)
                }),
        )
        .json()
        .init();

    info!(
        name = %config.service.name,
        version = env!("CARGO_PKG_VERSION"),
        tokens = config.tokens.len(),
        "Starting swap settlement service"
    );

    let (shutdown_tx, _shutdown_rx) = broadcast::channel::<()>(1);

    // ── 3. Load API credentials from env vars ───────────────
    let auth = ApiAuth::from_env()
        .context("Failed to load API credentials from env")?
        .map(Arc::new);
    if auth.is_none() {
        warn!("SWAP_API_KEY not set, outbound requests are unsigned");
    }

    // ── 4. Create HTTP clients with signing + retry ─────────
    let client_config = |base_url: &str| ApiClientConfig {
        base_url: base_url.trim_end_matches('/').to_string(),
        timeout: Duration::from_millis(config.api.timeout_ms),
        max_concurrent: 10,
        max_retries: config.api.max_retries,
        retry_base_delay: Duration::from_millis(200),
        requests_per_second: config.api.requests_per_second,
    };
    let backend_client = Arc::new(
        ApiClient::new(auth.clone(), client_config(&config.api.backend_url))
            .context("Failed to create backend client")?,
    );
    let ledger_client = Arc::new(
        ApiClient::new(auth, client_config(&config.api.ledger_url))
            .context("Failed to create ledger client")?,
    );

    // ── 5. Port adapters ────────────────────────────────────
    let ledger: Arc<dyn LedgerGateway> = Arc::new(HttpLedgerGateway::new(
        ledger_client,
        config.service.owner.clone(),
    ));
    let backend: Arc<dyn SwapBackend> = Arc::new(HttpSwapBackend::new(backend_client));

    // ── 6. Orchestrator ─────────────────────────────────────
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let events = EventBus::default();
    let catalog = Arc::new(TokenCatalog::new(config.token_descriptors()));
    let store = Arc::new(SwapJobStore::new(Arc::clone(&clock)));
    let allowance = Arc::new(AllowancePrecheck::new(
        Arc::clone(&ledger),
        Arc::clone(&clock),
        events.clone(),
        config.allowance_policy(),
    ));
    let reconciler = Arc::new(BalanceReconciler::new(
        Arc::clone(&ledger),
        Arc::clone(&clock),
        events.clone(),
        config.reconciler_config(),
    ));
    let monitor = SettlementMonitor::new(
        Arc::clone(&backend),
        Arc::clone(&store),
        reconciler,
        events.clone(),
        config.monitor_config(),
    );
    let submitter = Arc::new(SwapSubmitter::new(
        catalog,
        ledger,
        backend,
        allowance,
        Arc::clone(&store),
        monitor.clone(),
        events.clone(),
        clock,
        config.submitter_config(),
    ));

    // ── 7. Restore job history ──────────────────────────────
    let history = Arc::new(
        HistoryStore::new(&config.persistence.data_dir)
            .await
            .context("Failed to open history store")?,
    );
    match history.load().await {
        Ok(jobs) => {
            let restored = store.restore(jobs).await;
            info!(restored, "Job history restored");
        }
        Err(e) => warn!(error = %e, path = %history.path().display(), "Job history unreadable, starting empty"),
    }

    // ── 8. Background tasks ─────────────────────────────────
    let metrics = Arc::new(MetricsRegistry::new().context("Failed to register metrics")?);
    let metrics_handle = metrics.observe(store.subscribe(), events.subscribe());

    let notify_handle = tokio::spawn(log_notifications(
        events.subscribe(),
        shutdown_tx.subscribe(),
    ));

    let sweep_handle = tokio::spawn(retention_sweep(
        Arc::clone(&store),
        Arc::clone(&history),
        config.retention(),
        Duration::from_secs(config.store.purge_interval_secs),
        shutdown_tx.subscribe(),
    ));

    // ── 9. Swap API server ──────────────────────────────────
    let health = HealthState::new();
    let app_state = AppState {
        submitter,
        store: Arc::clone(&store),
        monitor: monitor.clone(),
        metrics,
        health: health.clone(),
    };
    let server_shutdown = shutdown_tx.subscribe();
    let bind_address = config.server.bind_address.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server::serve(app_state, bind_address, server_shutdown).await {
            error!(error = %e, "Swap API server failed");
        }
    });

    info!("All tasks spawned - service is running");

    // ── 10. Wait for SIGINT ─────────────────────────────────
    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for SIGINT");
    }
    info!("SIGINT received, initiating graceful shutdown");

    // 1. Readiness probe → 503, no new swaps
    health.mark_draining();

    // 2. Stop every poll loop and refuse new ones; unfinished jobs keep their last state
    let stopped = monitor.stop_all().await;
    info!(stopped, "Settlement monitors stopped");

    // 3. Signal all tasks to stop
    let _ = shutdown_tx.send(());

    // 4. Persist finished jobs
    let jobs = store.history().await;
    if let Err(e) = history.save(jobs.iter().map(|j| j.as_ref())).await {
        error!(error = %e, "Failed to save job history");
    }

    // 5. Wait for server and sweeps to finish (up to 5s)
    let _ = tokio::time::timeout(Duration::from_secs(5), server_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), sweep_handle).await;
    notify_handle.abort();
    metrics_handle.abort();

    info!("Shutdown complete");
    Ok(())
}

/// Log every user notification. Stands in for a UI toast sink.
async fn log_notifications(
    mut events: broadcast::Receiver<SwapEvent>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            event = events.recv() => match event {
                Ok(SwapEvent::Notification(n)) => {
                    let local_id = n.local_id.map(|id| id.to_string()).unwrap_or_default();
                    match n.level {
                        NotificationLevel::Error => {
                            warn!(local_id = %local_id, sticky = n.duration_ms == 0, "{}", n.text)
                        }
                        _ => info!(local_id = %local_id, level = ?n.level, "{}", n.text),
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Notification log lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }
}

/// Purge expired jobs and snapshot history on a fixed cadence.
async fn retention_sweep(
    store: Arc<SwapJobStore>,
    history: Arc<HistoryStore>,
    retention: chrono::Duration,
    every: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            _ = ticker.tick() => {
                // Snapshot before purging so nothing is lost between sweeps.
                let jobs = store.history().await;
                if let Err(e) = history.save(jobs.iter().map(|j| j.as_ref())).await {
                    warn!(error = %e, "History snapshot failed");
                }
                store.purge_expired(retention).await;
            }
        }
    }
}
