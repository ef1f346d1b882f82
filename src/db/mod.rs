//! Persistence of scan matches and run metadata.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::models::scan::{MatchRecord, ScanRun};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store connection failed: {0}")]
    Connection(String),

    #[error("store query failed: {0}")]
    Query(String),

    #[error("stored value could not be decoded: {0}")]
    Serialization(String),
}

impl From<tokio_postgres::Error> for StoreError {
    fn from(err: tokio_postgres::Error) -> Self {
        if err.is_closed() {
            StoreError::Connection(err.to_string())
        } else {
            StoreError::Query(err.to_string())
        }
    }
}

/// Durable home for matches and runs. Performs no business validation.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Verifies connectivity and creates the schema if needed.
    async fn ensure_ready(&self) -> Result<(), StoreError>;

    /// Deletes matches dated on or after `scan_date`. Returns the number removed.
    async fn clear_matches_from(&self, scan_date: NaiveDate) -> Result<u64, StoreError>;

    /// Inserts or replaces matches keyed by (symbol, venue, scan_date).
    async fn upsert_matches(&self, matches: &[MatchRecord]) -> Result<u64, StoreError>;

    async fn record_run(&self, run: &ScanRun) -> Result<(), StoreError>;

    async fn matches_for(&self, scan_date: NaiveDate) -> Result<Vec<MatchRecord>, StoreError>;

    /// Scan date of the most recently finished run.
    async fn latest_scan_date(&self) -> Result<Option<NaiveDate>, StoreError>;

    /// Newest first.
    async fn recent_runs(&self, limit: usize) -> Result<Vec<ScanRun>, StoreError>;
}
