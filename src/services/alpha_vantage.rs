//! Alpha Vantage TIME_SERIES_DAILY provider.
//!
//! Metered: the free tier allows a handful of calls per minute, so requests are
//! spaced by a governor rate limiter. Throttle notices arrive as HTTP 200 with a
//! `Note` or `Information` field instead of a time series.

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use chrono::NaiveDate;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::models::bar::{PriceBar, PriceSeries, SymbolKey};
use crate::services::market_data::{DataProvider, FetchError};

pub const ALPHA_VANTAGE_BASE_URL: &str = "https://www.alphavantage.co";
const PROVIDER: &str = "alpha_vantage";

#[derive(Debug, Deserialize)]
struct DailyResponse {
    #[serde(rename = "Time Series (Daily)")]
    series: Option<BTreeMap<String, DailyBar>>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DailyBar {
    #[serde(rename = "1. open")]
    open: String,
    #[serde(rename = "2. high")]
    high: String,
    #[serde(rename = "3. low")]
    low: String,
    #[serde(rename = "4. close")]
    close: String,
    #[serde(rename = "5. volume")]
    volume: String,
}

impl DailyBar {
    fn to_price_bar(&self, date: &str) -> Result<PriceBar, FetchError> {
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|e| FetchError::Malformed(format!("date '{date}': {e}")))?;
        let num = |field: &str, raw: &str| {
            raw.trim()
                .parse::<f64>()
                .map_err(|e| FetchError::Malformed(format!("{field} '{raw}' on {date}: {e}")))
        };
        Ok(PriceBar::new(
            date,
            num("open", &self.open)?,
            num("high", &self.high)?,
            num("low", &self.low)?,
            num("close", &self.close)?,
            num("volume", &self.volume)?,
        ))
    }
}

#[derive(Debug, Clone)]
pub struct AlphaVantageConfig {
    pub base_url: String,
    pub api_key: Option<SecretString>,
    pub timeout: Duration,
    /// Minimum gap between two requests. Zero disables spacing.
    pub spacing: Duration,
    pub max_retries: usize,
}

impl Default for AlphaVantageConfig {
    fn default() -> Self {
        Self {
            base_url: ALPHA_VANTAGE_BASE_URL.to_string(),
            api_key: None,
            timeout: Duration::from_secs(15),
            spacing: Duration::from_secs(12),
            max_retries: 2,
        }
    }
}

pub struct AlphaVantageProvider {
    client: reqwest::Client,
    config: AlphaVantageConfig,
    limiter: Option<DefaultDirectRateLimiter>,
}

impl AlphaVantageProvider {
    pub fn new(config: AlphaVantageConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().build()?;
        let limiter = Quota::with_period(config.spacing).map(RateLimiter::direct);
        Ok(Self {
            client,
            config,
            limiter,
        })
    }

    fn parse_response(key: &SymbolKey, resp: DailyResponse) -> Result<Vec<PriceBar>, FetchError> {
        if let Some(message) = resp.note.or(resp.information) {
            return Err(FetchError::RateLimited {
                provider: PROVIDER.into(),
                message,
            });
        }
        if resp.error_message.is_some() {
            return Err(FetchError::NotFound(key.ticker()));
        }
        let series = resp
            .series
            .ok_or_else(|| FetchError::Malformed("missing daily time series".into()))?;

        series
            .iter()
            .map(|(date, bar)| bar.to_price_bar(date))
            .collect()
    }

    async fn request_once(
        &self,
        key: &SymbolKey,
        api_key: &SecretString,
        depth: usize,
    ) -> Result<Vec<PriceBar>, FetchError> {
        let url = format!("{}/query", self.config.base_url.trim_end_matches('/'));
        let output_size = if depth > 100 { "full" } else { "compact" };
        let ticker = key.ticker();
        debug!(provider = PROVIDER, symbol = %key, output_size, "requesting daily series");

        let resp = self
            .client
            .get(&url)
            .query(&[
                ("function", "TIME_SERIES_DAILY"),
                ("symbol", ticker.as_str()),
                ("outputsize", output_size),
                ("apikey", api_key.expose_secret()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited {
                provider: PROVIDER.into(),
                message: "HTTP 429".into(),
            });
        }
        if !status.is_success() {
            return Err(FetchError::Http {
                provider: PROVIDER.into(),
                status: status.as_u16(),
            });
        }

        let body: DailyResponse = resp
            .json()
            .await
            .map_err(|e| FetchError::Malformed(format!("daily series for {}: {e}", key.ticker())))?;
        Self::parse_response(key, body)
    }
}

#[async_trait]
impl DataProvider for AlphaVantageProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn is_available(&self) -> bool {
        self.config.api_key.is_some()
    }

    fn timeout(&self) -> Duration {
        self.config.timeout
    }

    async fn ready(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }

    async fn fetch(&self, key: &SymbolKey, depth: usize) -> Result<PriceSeries, FetchError> {
        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| FetchError::Unavailable {
                provider: PROVIDER.into(),
            })?;

        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(500))
            .with_max_times(self.config.max_retries);

        let bars = (|| async { self.request_once(key, api_key, depth).await })
            .retry(backoff)
            .when(FetchError::is_retryable)
            .notify(|err: &FetchError, dur: Duration| {
                warn!(provider = PROVIDER, symbol = %key, error = %err, retry_in = ?dur, "retrying daily series request");
            })
            .await?;

        Ok(PriceSeries::from_unsorted(key.clone(), bars)?.truncate_to_recent(depth))
    }
}
