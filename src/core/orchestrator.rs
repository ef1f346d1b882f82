//! Batched scan orchestration.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinSet;

use crate::core::events::{ScanEvent, ScanObserver, SymbolOutcome};
use crate::db::{ResultStore, StoreError};
use crate::models::bar::SymbolKey;
use crate::models::scan::{
    MatchRecord, ScanCounts, ScanMode, ScanRun, ScanStatus, ScanSummary,
};
use crate::services::chain::ProviderChain;
use crate::services::market_data::FetchError;
use crate::signals::engine::SignalEngine;
use crate::signals::vcp::Rejection;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("a scan is already running")]
    AlreadyRunning,

    #[error("universe is empty")]
    EmptyUniverse,

    #[error("result store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRequest {
    pub mode: ScanMode,
    #[serde(default)]
    pub symbols: Vec<SymbolKey>,
    /// Date matches are attributed to; today (UTC) when absent.
    #[serde(default)]
    pub scan_date: Option<NaiveDate>,
}

impl ScanRequest {
    pub fn full() -> Self {
        Self {
            mode: ScanMode::Full,
            symbols: Vec::new(),
            scan_date: None,
        }
    }

    pub fn custom(symbols: Vec<SymbolKey>) -> Self {
        Self {
            mode: ScanMode::Custom,
            symbols,
            scan_date: None,
        }
    }

    pub fn with_scan_date(mut self, scan_date: NaiveDate) -> Self {
        self.scan_date = Some(scan_date);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub batch_size: usize,
    /// Pause between batches while the error rate is acceptable.
    pub batch_delay: Duration,
    /// Pause between batches once the error rate exceeds the threshold.
    pub throttled_delay: Duration,
    pub error_rate_threshold: f64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            batch_delay: Duration::from_millis(500),
            throttled_delay: Duration::from_secs(3),
            error_rate_threshold: 0.10,
        }
    }
}

/// Cooperative cancellation shared between the scanner and its triggers.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Clears the running flag however `run` exits.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Owns the in-flight run record. Dropping it before `finish` (the `run`
/// future was cancelled or its task aborted) marks the run `Failed` and
/// records it, so an interrupted scan never leaves `Running` behind.
struct ActiveRun<'a> {
    scanner: &'a Scanner,
    run: ScanRun,
    clock: Instant,
    recorded: bool,
    finished: bool,
}

impl ActiveRun<'_> {
    async fn finish(&mut self) -> ScanSummary {
        let scanner = self.scanner;
        self.run.finished_at = Utc::now();
        self.run.duration_ms = self.clock.elapsed().as_millis() as u64;

        self.recorded = true;
        if let Err(e) = scanner.store.record_run(&self.run).await {
            scanner.emit(ScanEvent::RunRecordFailed {
                run_id: self.run.run_id.clone(),
                error: e.to_string(),
            });
        }

        let summary = ScanSummary::from_run(&self.run);
        *scanner.status.write().await = self.run.status;
        *scanner.last_summary.write().await = Some(summary.clone());
        self.finished = true;
        scanner.emit(ScanEvent::RunFinished {
            summary: summary.clone(),
        });
        summary
    }

    fn abandon(&mut self) {
        let scanner = self.scanner;
        self.run.status = ScanStatus::Failed;
        self.run.error = Some(INTERRUPTED.to_string());
        self.run.finished_at = Utc::now();
        self.run.duration_ms = self.clock.elapsed().as_millis() as u64;

        let summary = ScanSummary::from_run(&self.run);
        if let Ok(mut status) = scanner.status.try_write() {
            *status = ScanStatus::Failed;
        }
        if let Ok(mut last) = scanner.last_summary.try_write() {
            *last = Some(summary.clone());
        }

        // Recording needs a runtime; without one only the in-memory state changes.
        if !self.recorded {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let store = scanner.store.clone();
                let observers = scanner.observers.clone();
                let run = self.run.clone();
                handle.spawn(async move {
                    if let Err(e) = store.record_run(&run).await {
                        let event = ScanEvent::RunRecordFailed {
                            run_id: run.run_id.clone(),
                            error: e.to_string(),
                        };
                        for observer in &observers {
                            observer.on_event(&event);
                        }
                    }
                });
            }
        }
        scanner.emit(ScanEvent::RunFinished { summary });
    }
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.abandon();
        }
    }
}

const INTERRUPTED: &str = "scan interrupted before completion";

/// What one spawned task reports back.
struct SymbolReport {
    key: SymbolKey,
    result: Result<Fetched, FetchError>,
}

struct Fetched {
    provider: String,
    is_real: bool,
    verdict: Result<MatchRecord, Rejection>,
}

pub struct Scanner {
    chain: Arc<ProviderChain>,
    engine: SignalEngine,
    store: Arc<dyn ResultStore>,
    universe: Vec<SymbolKey>,
    config: ScannerConfig,
    observers: Vec<Arc<dyn ScanObserver>>,
    running: AtomicBool,
    status: RwLock<ScanStatus>,
    last_summary: RwLock<Option<ScanSummary>>,
    cancel: CancellationFlag,
}

impl Scanner {
    pub fn new(
        chain: Arc<ProviderChain>,
        engine: SignalEngine,
        store: Arc<dyn ResultStore>,
        universe: Vec<SymbolKey>,
        config: ScannerConfig,
    ) -> Self {
        Self {
            chain,
            engine,
            store,
            universe,
            config,
            observers: Vec::new(),
            running: AtomicBool::new(false),
            status: RwLock::new(ScanStatus::Idle),
            last_summary: RwLock::new(None),
            cancel: CancellationFlag::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ScanObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Shares an externally owned flag, e.g. with a shutdown handler.
    pub fn with_cancellation(mut self, flag: CancellationFlag) -> Self {
        self.cancel = flag;
        self
    }

    pub fn store(&self) -> Arc<dyn ResultStore> {
        self.store.clone()
    }

    pub fn universe(&self) -> &[SymbolKey] {
        &self.universe
    }

    pub async fn status(&self) -> ScanStatus {
        *self.status.read().await
    }

    pub async fn last_summary(&self) -> Option<ScanSummary> {
        self.last_summary.read().await.clone()
    }

    /// Requests cancellation of the current run. Returns whether one was active.
    pub fn cancel(&self) -> bool {
        let active = self.running.load(Ordering::SeqCst);
        if active {
            self.cancel.cancel();
        }
        active
    }

    fn emit(&self, event: ScanEvent) {
        for observer in &self.observers {
            observer.on_event(&event);
        }
    }

    /// Runs one scan to completion.
    ///
    /// Fatal failures still produce a `Failed` run record and summary before
    /// the error is returned. `AlreadyRunning` touches nothing.
    pub async fn run(&self, request: ScanRequest) -> Result<ScanSummary, ScanError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ScanError::AlreadyRunning);
        }
        let _guard = RunningGuard(&self.running);
        self.cancel.reset();
        *self.status.write().await = ScanStatus::Running;

        let started_at = Utc::now();
        let clock = Instant::now();
        let scan_date = request.scan_date.unwrap_or_else(|| started_at.date_naive());
        let run_id = format!("scan-{}", started_at.format("%Y%m%dT%H%M%S%.3fZ"));

        let universe = dedupe(match request.mode {
            ScanMode::Full => self.universe.clone(),
            ScanMode::Custom => request.symbols,
        });
        let batch_size = self.config.batch_size.max(1);
        let batches = universe.len().div_ceil(batch_size);

        self.emit(ScanEvent::RunStarted {
            run_id: run_id.clone(),
            mode: request.mode,
            scan_date,
            universe_size: universe.len(),
            batches,
        });

        // Declared after `_guard` so it drops first and the slot stays taken
        // until an interrupted run has been marked.
        let mut active = ActiveRun {
            scanner: self,
            run: ScanRun {
                run_id,
                mode: request.mode,
                scan_date,
                started_at,
                finished_at: started_at,
                universe_size: universe.len(),
                counts: ScanCounts::default(),
                duration_ms: 0,
                status: ScanStatus::Running,
                error: None,
            },
            clock,
            recorded: false,
            finished: false,
        };

        let fatal = if universe.is_empty() {
            Some(ScanError::EmptyUniverse)
        } else {
            self.store
                .ensure_ready()
                .await
                .err()
                .map(ScanError::StoreUnavailable)
        };

        if let Some(err) = fatal {
            active.run.status = ScanStatus::Failed;
            active.run.error = Some(err.to_string());
            active.finish().await;
            return Err(err);
        }

        let cancelled = self
            .scan_batches(&universe, scan_date, &mut active.run.counts)
            .await;
        active.run.status = if cancelled {
            ScanStatus::Cancelled
        } else {
            ScanStatus::Completed
        };

        Ok(active.finish().await)
    }

    /// Returns true when the run stopped early because of cancellation.
    async fn scan_batches(
        &self,
        universe: &[SymbolKey],
        scan_date: NaiveDate,
        totals: &mut ScanCounts,
    ) -> bool {
        // The day's earlier matches stay in place until this run has
        // something to replace them with, or reaches its end.
        let mut cleared = false;

        let batch_size = self.config.batch_size.max(1);
        let batch_count = universe.len().div_ceil(batch_size);

        for (index, batch) in universe.chunks(batch_size).enumerate() {
            if self.cancel.is_cancelled() {
                self.emit(ScanEvent::RunCancelled {
                    processed: totals.processed,
                    remaining: universe.len() - totals.processed,
                });
                if !cleared {
                    self.clear_day(scan_date, totals).await;
                }
                return true;
            }

            self.emit(ScanEvent::BatchStarted {
                index,
                size: batch.len(),
            });
            let (mut counts, matches) = self.run_batch(batch).await;

            let matches: Vec<MatchRecord> = matches
                .into_iter()
                .map(|m| m.with_scan_date(scan_date))
                .collect();
            let mut persisted = 0;
            if !matches.is_empty() {
                if !cleared {
                    self.clear_day(scan_date, &mut counts).await;
                    cleared = true;
                }
                match self.store.upsert_matches(&matches).await {
                    Ok(_) => persisted = matches.len(),
                    Err(e) => {
                        counts.persist_failures += 1;
                        self.emit(ScanEvent::PersistFailed {
                            batch: Some(index),
                            error: e.to_string(),
                        });
                    }
                }
            }

            totals.merge(&counts);
            self.emit(ScanEvent::BatchCompleted {
                index,
                counts,
                persisted,
            });

            if index + 1 < batch_count {
                let error_rate = totals.error_rate();
                let delay = if error_rate > self.config.error_rate_threshold {
                    self.emit(ScanEvent::BackoffApplied {
                        after_batch: index,
                        error_rate,
                        delay: self.config.throttled_delay,
                    });
                    self.config.throttled_delay
                } else {
                    self.config.batch_delay
                };
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }

        if !cleared {
            self.clear_day(scan_date, totals).await;
        }
        false
    }

    async fn clear_day(&self, scan_date: NaiveDate, counts: &mut ScanCounts) {
        if let Err(e) = self.store.clear_matches_from(scan_date).await {
            counts.persist_failures += 1;
            self.emit(ScanEvent::PersistFailed {
                batch: None,
                error: e.to_string(),
            });
        }
    }

    /// Fans a batch out over a `JoinSet` and waits for every task.
    async fn run_batch(&self, batch: &[SymbolKey]) -> (ScanCounts, Vec<MatchRecord>) {
        let mut tasks = JoinSet::new();
        for key in batch {
            let chain = self.chain.clone();
            let engine = self.engine;
            let key = key.clone();
            tasks.spawn(async move {
                let result = chain.fetch(&key).await.map(|outcome| Fetched {
                    verdict: engine.evaluate(&outcome.series),
                    provider: outcome.provider,
                    is_real: outcome.is_real,
                });
                SymbolReport { key, result }
            });
        }

        let mut counts = ScanCounts::default();
        let mut matches = Vec::new();

        while let Some(joined) = tasks.join_next().await {
            counts.processed += 1;
            let report = match joined {
                Ok(report) => report,
                Err(e) => {
                    counts.errors += 1;
                    self.emit(ScanEvent::SymbolFailed {
                        key: None,
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            let fetched = match report.result {
                Ok(fetched) => fetched,
                Err(e) => {
                    counts.errors += 1;
                    self.emit(ScanEvent::SymbolFailed {
                        key: Some(report.key),
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            if fetched.is_real {
                counts.real_data += 1;
            } else {
                counts.synthetic_data += 1;
            }

            let outcome = match fetched.verdict {
                Ok(record) => {
                    counts.succeeded += 1;
                    counts.matches += 1;
                    let breakout = record.breakout_signal;
                    matches.push(record);
                    SymbolOutcome::Matched { breakout }
                }
                Err(Rejection::Filter(filter)) => {
                    counts.succeeded += 1;
                    SymbolOutcome::Rejected { filter }
                }
                Err(Rejection::InsufficientHistory { bars, required }) => {
                    counts.insufficient_history += 1;
                    SymbolOutcome::InsufficientHistory { bars, required }
                }
            };

            self.emit(ScanEvent::SymbolCompleted {
                key: report.key,
                provider: fetched.provider,
                is_real: fetched.is_real,
                outcome,
            });
        }

        (counts, matches)
    }
}

/// Drops repeated keys, keeping first occurrences in order.
fn dedupe(keys: Vec<SymbolKey>) -> Vec<SymbolKey> {
    let mut seen = HashSet::with_capacity(keys.len());
    keys.into_iter().filter(|k| seen.insert(k.clone())).collect()
}
