//! Scan outputs: match records, run metadata and the summary returned to callers.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::bar::Venue;

/// One VCP match. Unique per (symbol, venue, scan_date).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub symbol: String,
    pub venue: Venue,
    pub close: f64,
    pub volume: f64,
    pub pct_from_high: f64,
    pub atr14: f64,
    pub ema50: f64,
    pub ema150: f64,
    pub ema200: f64,
    pub volume_avg20: f64,
    pub breakout_signal: bool,
    /// Current ATR divided by the ATR of the preceding base.
    pub contraction_ratio: f64,
    /// 21-bar high/low range relative to the latest close.
    pub consolidation_ratio: f64,
    /// Date of the latest bar the classifier saw.
    pub bar_date: NaiveDate,
    /// Date the match is attributed to; the orchestrator stamps the run's scan date.
    pub scan_date: NaiveDate,
}

impl MatchRecord {
    pub fn with_scan_date(mut self, scan_date: NaiveDate) -> Self {
        self.scan_date = scan_date;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Idle => "idle",
            ScanStatus::Running => "running",
            ScanStatus::Completed => "completed",
            ScanStatus::Failed => "failed",
            ScanStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanStatus::Completed | ScanStatus::Failed | ScanStatus::Cancelled
        )
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    Full,
    Custom,
}

impl ScanMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanMode::Full => "full",
            ScanMode::Custom => "custom",
        }
    }
}

/// Aggregate counters for a run.
///
/// `processed == succeeded + errors + insufficient_history` always holds;
/// `real_data + synthetic_data == succeeded + insufficient_history`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCounts {
    pub processed: usize,
    pub succeeded: usize,
    pub real_data: usize,
    pub synthetic_data: usize,
    pub matches: usize,
    pub errors: usize,
    pub insufficient_history: usize,
    pub persist_failures: usize,
}

impl ScanCounts {
    pub fn merge(&mut self, other: &ScanCounts) {
        self.processed += other.processed;
        self.succeeded += other.succeeded;
        self.real_data += other.real_data;
        self.synthetic_data += other.synthetic_data;
        self.matches += other.matches;
        self.errors += other.errors;
        self.insufficient_history += other.insufficient_history;
        self.persist_failures += other.persist_failures;
    }

    pub fn error_rate(&self) -> f64 {
        ratio(self.errors, self.processed)
    }
}

/// Metadata for one orchestration pass. Written once, at the end of the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRun {
    pub run_id: String,
    pub mode: ScanMode,
    pub scan_date: NaiveDate,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub universe_size: usize,
    pub counts: ScanCounts,
    pub duration_ms: u64,
    pub status: ScanStatus,
    pub error: Option<String>,
}

/// What a trigger gets back once a run settles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub run_id: String,
    pub status: ScanStatus,
    pub scan_date: NaiveDate,
    pub universe_size: usize,
    pub counts: ScanCounts,
    pub duration_ms: u64,
    pub success_rate: f64,
    pub real_data_rate: f64,
    pub match_rate: f64,
    pub message: String,
}

impl ScanSummary {
    pub fn from_run(run: &ScanRun) -> Self {
        let counts = run.counts;
        let fetched = counts.real_data + counts.synthetic_data;
        let message = match run.status {
            ScanStatus::Completed => format!(
                "scanned {} of {} symbols, {} matches",
                counts.processed, run.universe_size, counts.matches
            ),
            ScanStatus::Cancelled => format!(
                "cancelled after {} of {} symbols, {} matches",
                counts.processed, run.universe_size, counts.matches
            ),
            ScanStatus::Failed => format!(
                "scan failed: {}",
                run.error.as_deref().unwrap_or("unknown error")
            ),
            ScanStatus::Idle | ScanStatus::Running => format!("scan {}", run.status),
        };

        Self {
            run_id: run.run_id.clone(),
            status: run.status,
            scan_date: run.scan_date,
            universe_size: run.universe_size,
            counts,
            duration_ms: run.duration_ms,
            success_rate: ratio(counts.succeeded, counts.processed),
            real_data_rate: ratio(counts.real_data, fetched),
            match_rate: ratio(counts.matches, counts.succeeded),
            message,
        }
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}
