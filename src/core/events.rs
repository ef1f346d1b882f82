//! Structured events emitted by the scan orchestrator.

use chrono::NaiveDate;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::models::bar::SymbolKey;
use crate::models::scan::{ScanCounts, ScanMode, ScanStatus, ScanSummary};
use crate::signals::vcp::VcpFilter;

/// How a symbol that was fetched successfully ended up.
#[derive(Debug, Clone, PartialEq)]
pub enum SymbolOutcome {
    Matched { breakout: bool },
    Rejected { filter: VcpFilter },
    InsufficientHistory { bars: usize, required: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    RunStarted {
        run_id: String,
        mode: ScanMode,
        scan_date: NaiveDate,
        universe_size: usize,
        batches: usize,
    },
    BatchStarted {
        index: usize,
        size: usize,
    },
    SymbolCompleted {
        key: SymbolKey,
        provider: String,
        is_real: bool,
        outcome: SymbolOutcome,
    },
    /// `key` is `None` when the task panicked before reporting back.
    SymbolFailed {
        key: Option<SymbolKey>,
        error: String,
    },
    BatchCompleted {
        index: usize,
        counts: ScanCounts,
        persisted: usize,
    },
    /// `batch` is `None` for the clear that precedes the first batch.
    PersistFailed {
        batch: Option<usize>,
        error: String,
    },
    BackoffApplied {
        after_batch: usize,
        error_rate: f64,
        delay: Duration,
    },
    RunCancelled {
        processed: usize,
        remaining: usize,
    },
    RunRecordFailed {
        run_id: String,
        error: String,
    },
    RunFinished {
        summary: ScanSummary,
    },
}

/// Receives every event of every run, in emission order.
pub trait ScanObserver: Send + Sync {
    fn on_event(&self, event: &ScanEvent);
}

/// Renders events as structured `tracing` records.
pub struct TracingObserver;

impl ScanObserver for TracingObserver {
    fn on_event(&self, event: &ScanEvent) {
        match event {
            ScanEvent::RunStarted {
                run_id,
                mode,
                scan_date,
                universe_size,
                batches,
            } => info!(
                run_id = %run_id,
                mode = mode.as_str(),
                scan_date = %scan_date,
                universe_size,
                batches,
                "scan started"
            ),
            ScanEvent::BatchStarted { index, size } => {
                debug!(batch = index, size, "batch started")
            }
            ScanEvent::SymbolCompleted {
                key,
                provider,
                is_real,
                outcome,
            } => match outcome {
                SymbolOutcome::Matched { breakout } => info!(
                    symbol = %key,
                    provider = %provider,
                    is_real,
                    breakout,
                    "vcp match"
                ),
                SymbolOutcome::Rejected { filter } => debug!(
                    symbol = %key,
                    provider = %provider,
                    is_real,
                    filter = %filter,
                    step = filter.number(),
                    "no match"
                ),
                SymbolOutcome::InsufficientHistory { bars, required } => debug!(
                    symbol = %key,
                    provider = %provider,
                    bars,
                    required,
                    "insufficient history"
                ),
            },
            ScanEvent::SymbolFailed { key, error } => match key {
                Some(key) => warn!(symbol = %key, error = %error, "symbol failed"),
                None => warn!(error = %error, "symbol task aborted"),
            },
            ScanEvent::BatchCompleted {
                index,
                counts,
                persisted,
            } => info!(
                batch = index,
                processed = counts.processed,
                matches = counts.matches,
                errors = counts.errors,
                persisted,
                "batch completed"
            ),
            ScanEvent::PersistFailed { batch, error } => {
                warn!(batch = ?batch, error = %error, "persisting matches failed")
            }
            ScanEvent::BackoffApplied {
                after_batch,
                error_rate,
                delay,
            } => warn!(
                after_batch,
                error_rate,
                delay_ms = delay.as_millis() as u64,
                "error rate high, slowing down"
            ),
            ScanEvent::RunCancelled {
                processed,
                remaining,
            } => warn!(processed, remaining, "scan cancelled"),
            ScanEvent::RunRecordFailed { run_id, error } => {
                warn!(run_id = %run_id, error = %error, "recording scan run failed")
            }
            ScanEvent::RunFinished { summary } => {
                let c = &summary.counts;
                if summary.status == ScanStatus::Failed {
                    warn!(
                        run_id = %summary.run_id,
                        status = %summary.status,
                        message = %summary.message,
                        "scan finished"
                    );
                } else {
                    info!(
                        run_id = %summary.run_id,
                        status = %summary.status,
                        processed = c.processed,
                        succeeded = c.succeeded,
                        real_data = c.real_data,
                        synthetic = c.synthetic_data,
                        matches = c.matches,
                        errors = c.errors,
                        insufficient_history = c.insufficient_history,
                        duration_ms = summary.duration_ms,
                        "scan finished"
                    );
                }
            }
        }
    }
}
