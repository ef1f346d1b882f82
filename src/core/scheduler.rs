//! Cron-based scheduler that triggers full-universe scans

use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{Notify, RwLock};
use tracing::{error, info, warn};

use crate::core::orchestrator::{ScanError, ScanRequest, Scanner};

/// Runs a full scan on every tick of a cron schedule.
pub struct ScanScheduler {
    scanner: Arc<Scanner>,
    schedule: Schedule,
    expression: String,
    handle: Arc<RwLock<Option<tokio::task::JoinHandle<()>>>>,
    shutdown: Arc<Notify>,
}

impl ScanScheduler {
    /// Create a new scheduler
    ///
    /// `expression` uses the six-field form with seconds, e.g.
    /// `0 30 16 * * Mon-Fri` for 16:30 UTC on weekdays.
    pub fn new(
        scanner: Arc<Scanner>,
        expression: &str,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let schedule = Schedule::from_str(expression)
            .map_err(|e| format!("Invalid cron expression '{}': {}", expression, e))?;

        info!(cron = %expression, "ScanScheduler: created");

        Ok(Self {
            scanner,
            schedule,
            expression: expression.to_string(),
            handle: Arc::new(RwLock::new(None)),
            shutdown: Arc::new(Notify::new()),
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Next fire time, if the schedule has one.
    pub fn next_tick(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.schedule.upcoming(chrono::Utc).next()
    }

    /// Start the scheduler
    pub async fn start(&self) {
        let scanner = self.scanner.clone();
        let schedule = self.schedule.clone();
        let shutdown = self.shutdown.clone();

        let handle = tokio::spawn(async move {
            info!("ScanScheduler: started, waiting for cron schedule...");

            loop {
                let Some(next_tick) = schedule.upcoming(chrono::Utc).next() else {
                    warn!("ScanScheduler: schedule has no upcoming ticks, stopping");
                    break;
                };
                let duration = (next_tick - chrono::Utc::now())
                    .to_std()
                    .unwrap_or_default();
                tokio::select! {
                    biased;
                    _ = shutdown.notified() => break,
                    _ = tokio::time::sleep(duration) => {}
                }

                info!(tick = %next_tick, "ScanScheduler: cron tick, starting full scan");
                match scanner.run(ScanRequest::full()).await {
                    Ok(summary) => info!(
                        run_id = %summary.run_id,
                        status = %summary.status,
                        matches = summary.counts.matches,
                        "ScanScheduler: scheduled scan finished"
                    ),
                    Err(ScanError::AlreadyRunning) => {
                        warn!("ScanScheduler: previous scan still running, skipping tick")
                    }
                    Err(e) => error!(error = %e, "ScanScheduler: scheduled scan failed"),
                }
            }
            info!("ScanScheduler: loop exited");
        });

        *self.handle.write().await = Some(handle);
        info!("ScanScheduler: started successfully");
    }

    /// Stop the scheduler
    ///
    /// Waits for a scan already in flight to finish, so callers that want a
    /// prompt stop cancel the scanner first. The run is then recorded as
    /// `Cancelled` rather than cut off mid-batch.
    pub async fn stop(&self) {
        let handle = self.handle.write().await.take();
        if let Some(h) = handle {
            self.shutdown.notify_one();
            if let Err(e) = h.await {
                error!(error = %e, "ScanScheduler: loop task failed");
            }
            info!("ScanScheduler: stopped");
        }
    }

    /// Check if the scheduler is running
    pub async fn is_running(&self) -> bool {
        self.handle.read().await.is_some()
    }
}
