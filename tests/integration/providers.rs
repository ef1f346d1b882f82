//! HTTP providers against mocked upstream APIs

use secrecy::SecretString;
use serde_json::json;
use std::time::Duration;
use vcp_scanner::services::alpha_vantage::{AlphaVantageConfig, AlphaVantageProvider};
use vcp_scanner::services::market_data::{DataProvider, FetchError};
use vcp_scanner::services::yahoo::{YahooConfig, YahooProvider};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::fixtures::{alpha_vantage_json, key, vcp_bars, yahoo_chart_json};

const CHART_PATH: &str = "/v8/finance/chart/005930.KS";

fn yahoo(server: &MockServer) -> YahooProvider {
    YahooProvider::new(YahooConfig {
        base_url: server.uri(),
        timeout: Duration::from_secs(5),
        max_retries: 1,
    })
    .unwrap()
}

fn alpha_vantage(server: &MockServer, api_key: Option<&str>) -> AlphaVantageProvider {
    AlphaVantageProvider::new(AlphaVantageConfig {
        base_url: server.uri(),
        api_key: api_key.map(|k| SecretString::new(k.into())),
        timeout: Duration::from_secs(5),
        spacing: Duration::ZERO,
        max_retries: 0,
    })
    .unwrap()
}

#[tokio::test]
async fn test_yahoo_fetches_daily_chart() {
    let server = MockServer::start().await;
    let bars = vcp_bars();
    Mock::given(method("GET"))
        .and(path(CHART_PATH))
        .and(query_param("range", "2y"))
        .and(query_param("interval", "1d"))
        .respond_with(ResponseTemplate::new(200).set_body_json(yahoo_chart_json(&bars)))
        .expect(1)
        .mount(&server)
        .await;

    let series = yahoo(&server).fetch(&key("005930"), 300).await.unwrap();

    assert_eq!(series.len(), 300);
    assert_eq!(series.bars(), &bars[..]);
}

#[tokio::test]
async fn test_yahoo_truncates_to_requested_depth() {
    let server = MockServer::start().await;
    let bars = vcp_bars();
    Mock::given(method("GET"))
        .and(path(CHART_PATH))
        .and(query_param("range", "1y"))
        .respond_with(ResponseTemplate::new(200).set_body_json(yahoo_chart_json(&bars)))
        .mount(&server)
        .await;

    let series = yahoo(&server).fetch(&key("005930"), 200).await.unwrap();

    assert_eq!(series.len(), 200);
    assert_eq!(series.last(), bars.last());
}

#[tokio::test]
async fn test_yahoo_404_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(path(CHART_PATH))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let err = yahoo(&server).fetch(&key("005930"), 300).await.unwrap_err();
    assert!(matches!(err, FetchError::NotFound(ref t) if t == "005930.KS"));
}

#[tokio::test]
async fn test_yahoo_429_is_rate_limited_without_retry() {
    let server = MockServer::start().await;
    Mock::given(path(CHART_PATH))
        .respond_with(ResponseTemplate::new(429))
        .expect(1)
        .mount(&server)
        .await;

    let err = yahoo(&server).fetch(&key("005930"), 300).await.unwrap_err();
    assert!(matches!(err, FetchError::RateLimited { .. }));
}

#[tokio::test]
async fn test_yahoo_server_error_is_retried() {
    let server = MockServer::start().await;
    Mock::given(path(CHART_PATH))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let err = yahoo(&server).fetch(&key("005930"), 300).await.unwrap_err();
    assert!(matches!(err, FetchError::Http { status: 503, .. }));
}

#[tokio::test]
async fn test_alpha_vantage_fetches_daily_series() {
    let server = MockServer::start().await;
    let bars = vcp_bars();
    Mock::given(method("GET"))
        .and(path("/query"))
        .and(query_param("function", "TIME_SERIES_DAILY"))
        .and(query_param("symbol", "005930.KS"))
        .and(query_param("outputsize", "full"))
        .and(query_param("apikey", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(alpha_vantage_json(&bars)))
        .expect(1)
        .mount(&server)
        .await;

    let series = alpha_vantage(&server, Some("test-key"))
        .fetch(&key("005930"), 300)
        .await
        .unwrap();

    assert_eq!(series.len(), 300);
    assert_eq!(series.bars(), &bars[..]);
}

#[tokio::test]
async fn test_alpha_vantage_note_is_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(path("/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Note": "Our standard API call frequency is 25 requests per day."
        })))
        .mount(&server)
        .await;

    let err = alpha_vantage(&server, Some("test-key"))
        .fetch(&key("005930"), 300)
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::RateLimited { ref message, .. } if message.contains("frequency")));
}

#[tokio::test]
async fn test_alpha_vantage_without_key_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(path("/query"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let provider = alpha_vantage(&server, None);
    assert!(!provider.is_available());
    let err = provider.fetch(&key("005930"), 300).await.unwrap_err();
    assert!(matches!(err, FetchError::Unavailable { .. }));
}
