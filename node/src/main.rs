// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::sync::Arc;
use std::time::Duration;
use tamperseal_collector::clock::unix_now;
use tamperseal_collector::config::CollectorConfig;
use tamperseal_collector::ledger::{HttpLedgerClient, MemoryLedger, SharedLedger};
use tamperseal_collector::persistence::StorePersister;
use tamperseal_collector::scheduler::{AnchorScheduler, SchedulerConfig};
use tamperseal_collector::server::{build_router, AppState};
use tamperseal_collector::store::CollectorStore;
use tamperseal_collector::telemetry;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    telemetry::init_telemetry();

    let cfg = match CollectorConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(2);
        }
    };

    tracing::info!(
        bind = %cfg.bind_addr,
        protocol = ?cfg.protocol,
        anchor_interval_secs = cfg.anchor_interval_secs,
        scheduler_period_secs = cfg.scheduler_period_secs,
        snapshot = ?cfg.snapshot_path,
        "Initializing TamperSeal collector"
    );

    let store = Arc::new(CollectorStore::new());
    let persister = cfg.snapshot_path.clone().map(|p| Arc::new(StorePersister::new(p)));

    // Load Snapshot if present. Refuse to start on a corrupt one.
    if let Some(persister) = &persister {
        match persister.load_into(&store).await {
            Ok(Some(meta)) => tracing::info!(
                devices = meta.device_count,
                anchors = meta.anchor_count,
                reports = meta.report_count,
                "Snapshot restored from {:?}",
                persister.path()
            ),
            Ok(None) => tracing::info!("No snapshot at {:?}; starting empty", persister.path()),
            Err(e) => {
                tracing::error!("Failed to restore snapshot: {}", e);
                std::process::exit(1);
            }
        }
    }

    let ledger: SharedLedger = match &cfg.ledger_url {
        Some(url) => {
            match HttpLedgerClient::new(url, Duration::from_secs(cfg.ledger_timeout_secs)) {
                Ok(client) => Arc::new(client),
                Err(e) => {
                    tracing::error!("{}", e);
                    std::process::exit(2);
                }
            }
        }
        None => {
            tracing::warn!("No TAMPERSEAL_LEDGER_URL set: commitments go to the in-process ledger");
            Arc::new(MemoryLedger::new())
        }
    };

    let shutdown = CancellationToken::new();

    let scheduler = Arc::new(AnchorScheduler::new(
        store.clone(),
        ledger.clone(),
        SchedulerConfig::from(&cfg),
        persister.clone(),
    ));
    let scheduler_task = tokio::spawn(scheduler.clone().run(shutdown.clone()));

    // Spawn Persistence Task
    if let (Some(persister), Some(secs)) = (persister.clone(), cfg.auto_snapshot_interval_secs) {
        let store = store.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(secs.max(1)));
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {}
                }
                tracing::debug!("Auto-snapshotting...");
                match persister.persist(&store, unix_now()).await {
                    Ok(_) => tracing::info!("Snapshot saved to {:?}", persister.path()),
                    Err(e) => tracing::error!("Snapshot failed: {}", e),
                }
            }
        });
    }

    let addr = cfg.bind_addr;
    let app = build_router(AppState {
        store: store.clone(),
        ledger,
        scheduler,
        config: Arc::new(cfg),
    });

    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    tracing::info!("Listening on {}", addr);

    let signal = shutdown.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutdown requested");
            signal.cancel();
        })
        .await;
    if let Err(e) = served {
        tracing::error!("Server error: {}", e);
    }

    shutdown.cancel();
    let _ = scheduler_task.await;

    if let Some(persister) = &persister {
        match persister.persist(&store, unix_now()).await {
            Ok(_) => tracing::info!("Final snapshot saved to {:?}", persister.path()),
            Err(e) => tracing::error!("Final snapshot failed: {}", e),
        }
    }
}
