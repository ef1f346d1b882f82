//! In-process store for tests and database-less runs.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::db::{ResultStore, StoreError};
use crate::models::bar::Venue;
use crate::models::scan::{MatchRecord, ScanRun};

type MatchKey = (NaiveDate, Venue, String);

#[derive(Default)]
pub struct MemoryStore {
    matches: RwLock<BTreeMap<MatchKey, MatchRecord>>,
    runs: RwLock<Vec<ScanRun>>,
    unavailable: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `ensure_ready` fail, as if the database were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Makes match writes fail while reads keep working.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn match_count(&self) -> usize {
        self.matches.read().await.len()
    }

    fn check_writes(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Query("writes disabled".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn ensure_ready(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Connection("memory store marked unavailable".into()));
        }
        Ok(())
    }

    async fn clear_matches_from(&self, scan_date: NaiveDate) -> Result<u64, StoreError> {
        self.check_writes()?;
        let mut matches = self.matches.write().await;
        let before = matches.len();
        matches.retain(|(date, _, _), _| *date < scan_date);
        Ok((before - matches.len()) as u64)
    }

    async fn upsert_matches(&self, records: &[MatchRecord]) -> Result<u64, StoreError> {
        self.check_writes()?;
        let mut matches = self.matches.write().await;
        for record in records {
            matches.insert(
                (record.scan_date, record.venue, record.symbol.clone()),
                record.clone(),
            );
        }
        Ok(records.len() as u64)
    }

    async fn record_run(&self, run: &ScanRun) -> Result<(), StoreError> {
        self.runs.write().await.push(run.clone());
        Ok(())
    }

    async fn matches_for(&self, scan_date: NaiveDate) -> Result<Vec<MatchRecord>, StoreError> {
        let matches = self.matches.read().await;
        Ok(matches
            .iter()
            .filter(|((date, _, _), _)| *date == scan_date)
            .map(|(_, record)| record.clone())
            .collect())
    }

    async fn latest_scan_date(&self) -> Result<Option<NaiveDate>, StoreError> {
        let runs = self.runs.read().await;
        if let Some(run) = runs.iter().max_by_key(|r| r.finished_at) {
            return Ok(Some(run.scan_date));
        }
        let matches = self.matches.read().await;
        Ok(matches.keys().map(|(date, _, _)| *date).max())
    }

    async fn recent_runs(&self, limit: usize) -> Result<Vec<ScanRun>, StoreError> {
        let runs = self.runs.read().await;
        let mut recent: Vec<ScanRun> = runs.iter().cloned().collect();
        recent.sort_by(|a, b| b.finished_at.cmp(&a.finished_at));
        recent.truncate(limit);
        Ok(recent)
    }
}
