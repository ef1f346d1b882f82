//! VCP Scanner
//!
//! Serves the scan API and, when `SCAN_CRON` is set, runs scheduled
//! full-universe scans.

use dotenvy::dotenv;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use vcp_scanner::config::{self, ScannerSettings, Universe};
use vcp_scanner::core::events::TracingObserver;
use vcp_scanner::core::http::{start_server, AppState};
use vcp_scanner::core::orchestrator::{ScanRequest, Scanner};
use vcp_scanner::core::scheduler::ScanScheduler;
use vcp_scanner::db::{MemoryStore, PostgresStore, ResultStore};
use vcp_scanner::logging;
use vcp_scanner::models::scan::ScanStatus;
use vcp_scanner::metrics::{Metrics, MetricsObserver};
use vcp_scanner::signals::engine::SignalEngine;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Load environment variables from .env if present
    dotenv().ok();

    logging::init_logging();

    let settings = ScannerSettings::from_env()?;
    let env = config::get_environment();
    info!("Starting VCP Scanner");
    info!(environment = %env, "Environment");

    let metrics = Arc::new(Metrics::new()?);

    let universe = Universe::from_file(&settings.universe_path)?;
    info!(
        path = %settings.universe_path.display(),
        symbols = universe.len(),
        "Universe loaded"
    );
    if universe.is_empty() {
        warn!("Universe is empty - full scans will fail until symbols are configured");
    }

    let store: Arc<dyn ResultStore> = match &settings.database_url {
        Some(url) => {
            info!("Connecting to PostgreSQL...");
            let store = PostgresStore::connect(url).await?;
            store.ensure_ready().await?;
            metrics.database_connected.set(1.0);
            info!("PostgreSQL connected");
            Arc::new(store)
        }
        None => {
            warn!("DATABASE_URL not set - results are kept in memory and lost on exit");
            Arc::new(MemoryStore::new())
        }
    };

    let chain = Arc::new(settings.provider_chain()?);
    info!(providers = ?chain.provider_names(), "Provider chain ready");
    if settings.alpha_vantage_api_key.is_none() {
        info!("ALPHA_VANTAGE_API_KEY not set - Alpha Vantage will be skipped");
    }

    let scanner = Arc::new(
        Scanner::new(
            chain,
            SignalEngine::new(settings.min_bars),
            store,
            universe.keys(),
            settings.scanner_config(),
        )
        .with_observer(Arc::new(TracingObserver))
        .with_observer(Arc::new(MetricsObserver::new(metrics.clone()))),
    );

    let scheduler = match &settings.scan_cron {
        Some(expr) => {
            let scheduler = ScanScheduler::new(scanner.clone(), expr)?;
            scheduler.start().await;
            if let Some(next) = scheduler.next_tick() {
                info!(cron = %expr, next = %next, "Scheduled scans enabled");
            }
            Some(scheduler)
        }
        None => {
            info!("SCAN_CRON not set - scans run only on request");
            None
        }
    };

    let initial_scan = settings.scan_on_start.then(|| {
        let scanner = scanner.clone();
        tokio::spawn(async move {
            info!("SCAN_ON_START set - running initial full scan");
            if let Err(e) = scanner.run(ScanRequest::full()).await {
                error!(error = %e, "Initial scan failed");
            }
        })
    });

    let state = AppState::new(scanner.clone(), metrics);
    let port = settings.port;
    let server = tokio::spawn(async move {
        if let Err(e) = start_server(state, port).await {
            error!(error = %e, "HTTP server error");
        }
    });

    info!("Scanner started, waiting for shutdown signal...");
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Shutting down scanner...");
        }
        _ = server => {
            warn!("HTTP server exited");
        }
    }

    if scanner.cancel() {
        info!("Cancellation requested for running scan");
    }
    if let Some(scheduler) = scheduler {
        scheduler.stop().await;
    }
    if let Some(handle) = initial_scan {
        if let Err(e) = handle.await {
            error!(error = %e, "Initial scan task failed");
        }
    }
    // Request-triggered runs live on their own tasks; give them a bounded
    // window to reach a batch boundary and record themselves.
    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while scanner.status().await == ScanStatus::Running {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await;
    if drained.is_err() {
        warn!("Running scan did not stop within the shutdown grace period");
    }
    info!("Scanner stopped");

    Ok(())
}
