//! Unit tests for the provider chain

use std::sync::Arc;
use std::time::Duration;
use vcp_scanner::services::chain::{AttemptOutcome, ChainConfig, ProviderChain};
use vcp_scanner::services::market_data::{DataProvider, FetchError};

use crate::fixtures::{key, shaped_bars, vcp_bars, Shape};
use crate::stubs::{Script, ScriptedProvider};

fn chain(providers: Vec<Arc<ScriptedProvider>>) -> ProviderChain {
    ProviderChain::new(
        providers
            .into_iter()
            .map(|p| p as Arc<dyn DataProvider>)
            .collect(),
        ChainConfig::default(),
    )
}

fn short_bars(n: usize) -> Vec<vcp_scanner::models::bar::PriceBar> {
    shaped_bars(Shape {
        bars: n,
        ..Shape::default()
    })
}

#[tokio::test]
async fn test_first_success_wins() {
    let primary = Arc::new(ScriptedProvider::new("primary").script("005930", Script::Bars(vcp_bars())));
    let backup = Arc::new(ScriptedProvider::new("backup").script("005930", Script::Bars(vcp_bars())));

    let outcome = chain(vec![primary.clone(), backup.clone()])
        .fetch(&key("005930"))
        .await
        .unwrap();

    assert_eq!(outcome.provider, "primary");
    assert!(outcome.is_real);
    assert_eq!(outcome.series.len(), 300);
    assert_eq!(outcome.attempts.len(), 1);
    assert_eq!(primary.calls(), 1);
    assert_eq!(backup.calls(), 0);
}

#[tokio::test]
async fn test_unavailable_provider_is_skipped() {
    let keyless = Arc::new(
        ScriptedProvider::new("keyless")
            .unavailable()
            .script("005930", Script::Bars(vcp_bars())),
    );
    let backup = Arc::new(ScriptedProvider::new("backup").script("005930", Script::Bars(vcp_bars())));

    let outcome = chain(vec![keyless.clone(), backup])
        .fetch(&key("005930"))
        .await
        .unwrap();

    assert_eq!(outcome.provider, "backup");
    assert_eq!(outcome.attempts[0].outcome, AttemptOutcome::Skipped);
    assert_eq!(keyless.calls(), 0);
}

#[tokio::test]
async fn test_hanging_provider_times_out() {
    let slow = Arc::new(
        ScriptedProvider::new("slow")
            .with_timeout(Duration::from_millis(20))
            .script("005930", Script::Hang),
    );
    let backup = Arc::new(ScriptedProvider::new("backup").script("005930", Script::Bars(vcp_bars())));

    let outcome = chain(vec![slow, backup])
        .fetch(&key("005930"))
        .await
        .unwrap();

    assert_eq!(outcome.provider, "backup");
    match &outcome.attempts[0].outcome {
        AttemptOutcome::Failed(message) => assert!(message.contains("timed out")),
        other => panic!("expected timeout, got {:?}", other),
    }
}

#[tokio::test]
async fn test_synthetic_fallback_is_marked_not_real() {
    let real = Arc::new(ScriptedProvider::new("real").script("005930", Script::Network));
    let synthetic = Arc::new(
        ScriptedProvider::new("synthetic")
            .synthetic()
            .script("005930", Script::Bars(vcp_bars())),
    );

    let outcome = chain(vec![real, synthetic])
        .fetch(&key("005930"))
        .await
        .unwrap();

    assert_eq!(outcome.provider, "synthetic");
    assert!(!outcome.is_real);
    assert_eq!(outcome.attempts.len(), 2);
}

#[tokio::test]
async fn test_short_series_falls_through() {
    let short = Arc::new(ScriptedProvider::new("short").script("005930", Script::Bars(short_bars(150))));
    let full = Arc::new(ScriptedProvider::new("full").script("005930", Script::Bars(vcp_bars())));

    let outcome = chain(vec![short, full])
        .fetch(&key("005930"))
        .await
        .unwrap();

    assert_eq!(outcome.provider, "full");
    assert_eq!(
        outcome.attempts[0].outcome,
        AttemptOutcome::Short { bars: 150 }
    );
}

#[tokio::test]
async fn test_longest_real_partial_returned_when_nothing_else() {
    let a = Arc::new(ScriptedProvider::new("a").script("005930", Script::Bars(short_bars(120))));
    let b = Arc::new(ScriptedProvider::new("b").script("005930", Script::Bars(short_bars(180))));
    let c = Arc::new(ScriptedProvider::new("c"));

    let outcome = chain(vec![a, b, c])
        .fetch(&key("005930"))
        .await
        .unwrap();

    assert_eq!(outcome.provider, "b");
    assert!(outcome.is_real);
    assert_eq!(outcome.series.len(), 180);
    assert_eq!(outcome.attempts.len(), 3);
}

#[tokio::test]
async fn test_exhausted_when_every_provider_fails() {
    let a = Arc::new(ScriptedProvider::new("a").script("005930", Script::Network));
    let b = Arc::new(ScriptedProvider::new("b"));

    let err = tokio_test::assert_err!(chain(vec![a, b]).fetch(&key("005930")).await);
    assert!(matches!(err, FetchError::Exhausted(ref k) if k.contains("005930")));
}

#[tokio::test]
async fn test_requests_target_depth() {
    let long = shaped_bars(Shape {
        bars: 400,
        ..Shape::default()
    });
    let p = Arc::new(ScriptedProvider::new("p").script("005930", Script::Bars(long)));
    let outcome = chain(vec![p]).fetch(&key("005930")).await.unwrap();
    assert_eq!(outcome.series.len(), ChainConfig::default().target_depth);
}
