//! Unit tests for the in-memory result store

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use vcp_scanner::db::{MemoryStore, ResultStore, StoreError};
use vcp_scanner::models::bar::Venue;
use vcp_scanner::models::scan::{MatchRecord, ScanCounts, ScanMode, ScanRun, ScanStatus};
use vcp_scanner::signals::vcp::VcpClassifier;

use crate::fixtures::vcp_series;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
}

fn record(symbol: &str, scan_date: NaiveDate) -> MatchRecord {
    VcpClassifier::default()
        .classify(&vcp_series(symbol))
        .unwrap()
        .with_scan_date(scan_date)
}

fn run(id: &str, scan_date: NaiveDate, finished_minute: i64) -> ScanRun {
    let started = Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap();
    ScanRun {
        run_id: id.to_string(),
        mode: ScanMode::Full,
        scan_date,
        started_at: started,
        finished_at: started + Duration::minutes(finished_minute),
        universe_size: 3,
        counts: ScanCounts::default(),
        duration_ms: 0,
        status: ScanStatus::Completed,
        error: None,
    }
}

#[tokio::test]
async fn test_upsert_replaces_same_key() {
    let store = MemoryStore::new();
    let first = record("005930", day(3));
    let mut second = first.clone();
    second.close += 1.0;

    store.upsert_matches(&[first]).await.unwrap();
    store.upsert_matches(&[second.clone()]).await.unwrap();

    let stored = store.matches_for(day(3)).await.unwrap();
    assert_eq!(stored, vec![second]);
    assert_eq!(store.match_count().await, 1);
}

#[tokio::test]
async fn test_same_symbol_on_other_venue_is_distinct() {
    let store = MemoryStore::new();
    let kospi = record("123456", day(3));
    let mut kosdaq = kospi.clone();
    kosdaq.venue = Venue::Kosdaq;

    store.upsert_matches(&[kospi, kosdaq]).await.unwrap();
    assert_eq!(store.matches_for(day(3)).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_clear_removes_dates_on_or_after() {
    let store = MemoryStore::new();
    store
        .upsert_matches(&[
            record("005930", day(3)),
            record("005930", day(4)),
            record("000660", day(5)),
        ])
        .await
        .unwrap();

    let removed = store.clear_matches_from(day(4)).await.unwrap();

    assert_eq!(removed, 2);
    assert_eq!(store.matches_for(day(3)).await.unwrap().len(), 1);
    assert!(store.matches_for(day(4)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_recent_runs_newest_first_and_limited() {
    let store = MemoryStore::new();
    store.record_run(&run("a", day(3), 1)).await.unwrap();
    store.record_run(&run("c", day(5), 30)).await.unwrap();
    store.record_run(&run("b", day(4), 10)).await.unwrap();

    let runs = store.recent_runs(2).await.unwrap();
    let ids: Vec<&str> = runs.iter().map(|r| r.run_id.as_str()).collect();
    assert_eq!(ids, vec!["c", "b"]);
}

#[tokio::test]
async fn test_latest_scan_date_follows_last_finished_run() {
    let store = MemoryStore::new();
    assert_eq!(store.latest_scan_date().await.unwrap(), None);

    store.upsert_matches(&[record("005930", day(7))]).await.unwrap();
    assert_eq!(store.latest_scan_date().await.unwrap(), Some(day(7)));

    // A later run for an earlier date wins over stored match dates.
    store.record_run(&run("backfill", day(3), 5)).await.unwrap();
    assert_eq!(store.latest_scan_date().await.unwrap(), Some(day(3)));
}

#[tokio::test]
async fn test_failure_switches() {
    let store = MemoryStore::new();
    store.set_unavailable(true);
    assert!(matches!(
        store.ensure_ready().await,
        Err(StoreError::Connection(_))
    ));

    store.set_unavailable(false);
    store.set_fail_writes(true);
    assert!(store.ensure_ready().await.is_ok());
    assert!(store
        .upsert_matches(&[record("005930", day(3))])
        .await
        .is_err());
    assert!(store.clear_matches_from(day(3)).await.is_err());
    assert!(store.matches_for(day(3)).await.unwrap().is_empty());
}
