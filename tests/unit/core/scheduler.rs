//! Unit tests for the cron scheduler's shutdown path

use std::sync::Arc;
use std::time::Duration;
use vcp_scanner::core::orchestrator::{Scanner, ScannerConfig};
use vcp_scanner::core::scheduler::ScanScheduler;
use vcp_scanner::db::{MemoryStore, ResultStore};
use vcp_scanner::models::scan::ScanStatus;
use vcp_scanner::services::chain::{ChainConfig, ProviderChain};
use vcp_scanner::services::market_data::DataProvider;
use vcp_scanner::signals::engine::SignalEngine;

use crate::fixtures::key;
use crate::stubs::{Script, ScriptedProvider};

fn slow_scanner(store: Arc<MemoryStore>) -> Arc<Scanner> {
    let symbols = ["000001", "000002", "000003"];
    let provider = symbols.iter().fold(
        ScriptedProvider::new("slow").with_timeout(Duration::from_millis(300)),
        |p, s| p.script(s, Script::Hang),
    );
    let chain = ProviderChain::new(
        vec![Arc::new(provider) as Arc<dyn DataProvider>],
        ChainConfig::default(),
    );
    Arc::new(Scanner::new(
        Arc::new(chain),
        SignalEngine::default(),
        store,
        symbols.iter().map(|s| key(s)).collect(),
        ScannerConfig {
            batch_size: 1,
            batch_delay: Duration::ZERO,
            throttled_delay: Duration::ZERO,
            error_rate_threshold: 1.0,
        },
    ))
}

#[tokio::test]
async fn test_stop_lets_scheduled_scan_record_cancellation() {
    let store = Arc::new(MemoryStore::new());
    let scanner = slow_scanner(store.clone());
    let scheduler = ScanScheduler::new(scanner.clone(), "* * * * * *").unwrap();
    scheduler.start().await;

    let mut waited = Duration::ZERO;
    while scanner.status().await != ScanStatus::Running {
        assert!(waited < Duration::from_secs(3), "scheduled scan never started");
        tokio::time::sleep(Duration::from_millis(20)).await;
        waited += Duration::from_millis(20);
    }

    assert!(scanner.cancel());
    scheduler.stop().await;
    assert!(!scheduler.is_running().await);

    assert_eq!(scanner.status().await, ScanStatus::Cancelled);
    let runs = store.recent_runs(5).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, ScanStatus::Cancelled);
    assert!(runs[0].counts.processed < 3);
}
