//! Yahoo Finance daily bars via the v8 chart API.

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use chrono::DateTime;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::models::bar::{PriceBar, PriceSeries, SymbolKey};
use crate::services::market_data::{DataProvider, FetchError};

pub const YAHOO_BASE_URL: &str = "https://query2.finance.yahoo.com";
const PROVIDER: &str = "yahoo";

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    meta: Option<ChartMeta>,
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    gmtoffset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Clone)]
pub struct YahooConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub max_retries: usize,
}

impl Default for YahooConfig {
    fn default() -> Self {
        Self {
            base_url: YAHOO_BASE_URL.to_string(),
            timeout: Duration::from_secs(10),
            max_retries: 2,
        }
    }
}

pub struct YahooProvider {
    client: reqwest::Client,
    config: YahooConfig,
}

impl YahooProvider {
    pub fn new(config: YahooConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) vcp-scanner")
            .build()?;
        Ok(Self { client, config })
    }

    /// Smallest chart range that covers `depth` trading days.
    fn range_for(depth: usize) -> &'static str {
        match depth {
            0..=240 => "1y",
            241..=490 => "2y",
            _ => "5y",
        }
    }

    fn chart_url(&self, key: &SymbolKey, depth: usize) -> String {
        format!(
            "{}/v8/finance/chart/{}?range={}&interval=1d",
            self.config.base_url.trim_end_matches('/'),
            key.ticker(),
            Self::range_for(depth)
        )
    }

    fn parse_response(key: &SymbolKey, resp: ChartResponse) -> Result<Vec<PriceBar>, FetchError> {
        let result = match resp.chart.result {
            Some(result) => result,
            None => {
                return Err(match resp.chart.error {
                    Some(err) if err.code == "Not Found" => FetchError::NotFound(key.ticker()),
                    Some(err) => FetchError::Malformed(format!(
                        "{}: {}",
                        err.code,
                        err.description.unwrap_or_default()
                    )),
                    None => FetchError::Malformed("empty result with no error".into()),
                })
            }
        };

        let data = result
            .into_iter()
            .next()
            .ok_or_else(|| FetchError::Malformed("result array is empty".into()))?;

        let timestamps = data
            .timestamp
            .ok_or_else(|| FetchError::NotFound(key.ticker()))?;

        let quote = data
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| FetchError::Malformed("no quote data".into()))?;

        // Exchange-local dates: midnight KST is 15:00 UTC the previous day.
        let offset = data.meta.and_then(|m| m.gmtoffset).unwrap_or(0);

        let mut bars = Vec::with_capacity(timestamps.len());
        for (i, &ts) in timestamps.iter().enumerate() {
            let date = DateTime::from_timestamp(ts + offset, 0)
                .map(|dt| dt.date_naive())
                .ok_or_else(|| FetchError::Malformed(format!("invalid timestamp: {ts}")))?;

            let field = |column: &Vec<Option<f64>>| column.get(i).copied().flatten();
            // Holidays and halted sessions come back as nulls.
            let (Some(open), Some(high), Some(low), Some(close)) = (
                field(&quote.open),
                field(&quote.high),
                field(&quote.low),
                field(&quote.close),
            ) else {
                continue;
            };
            let volume = field(&quote.volume).unwrap_or(0.0);

            bars.push(PriceBar::new(date, open, high, low, close, volume));
        }

        Ok(bars)
    }

    async fn request_once(&self, key: &SymbolKey, depth: usize) -> Result<Vec<PriceBar>, FetchError> {
        let url = self.chart_url(key, depth);
        debug!(provider = PROVIDER, symbol = %key, %url, "requesting chart");

        let resp = self.client.get(&url).send().await?;
        let status = resp.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited {
                provider: PROVIDER.into(),
                message: "HTTP 429".into(),
            });
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(key.ticker()));
        }
        if !status.is_success() {
            return Err(FetchError::Http {
                provider: PROVIDER.into(),
                status: status.as_u16(),
            });
        }

        let chart: ChartResponse = resp
            .json()
            .await
            .map_err(|e| FetchError::Malformed(format!("chart for {}: {e}", key.ticker())))?;
        Self::parse_response(key, chart)
    }
}

#[async_trait]
impl DataProvider for YahooProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn timeout(&self) -> Duration {
        self.config.timeout
    }

    async fn fetch(&self, key: &SymbolKey, depth: usize) -> Result<PriceSeries, FetchError> {
        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(250))
            .with_max_times(self.config.max_retries);

        let bars = (|| async { self.request_once(key, depth).await })
            .retry(backoff)
            .when(FetchError::is_retryable)
            .notify(|err: &FetchError, dur: Duration| {
                warn!(provider = PROVIDER, symbol = %key, error = %err, retry_in = ?dur, "retrying chart request");
            })
            .await?;

        Ok(PriceSeries::from_unsorted(key.clone(), bars)?.truncate_to_recent(depth))
    }
}
