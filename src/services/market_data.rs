//! Market data provider interface shared by every daily-bar source.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::models::bar::{PriceSeries, SeriesError, SymbolKey};

#[derive(Debug, Error)]
pub enum FetchError {
    /// Credential missing; the provider is skipped, not counted as a failure.
    #[error("provider {provider} unavailable")]
    Unavailable { provider: String },

    #[error("{provider} timed out after {after:?}")]
    Timeout { provider: String, after: Duration },

    #[error("network error: {0}")]
    Network(String),

    #[error("{provider} rate limited: {message}")]
    RateLimited { provider: String, message: String },

    #[error("HTTP {status} from {provider}")]
    Http { provider: String, status: u16 },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("symbol not found: {0}")]
    NotFound(String),

    #[error("invalid series: {0}")]
    Series(#[from] SeriesError),

    #[error("{provider} returned {bars} bars, {required} required")]
    InsufficientHistory {
        provider: String,
        bars: usize,
        required: usize,
    },

    #[error("all providers failed for {0}")]
    Exhausted(String),
}

impl FetchError {
    /// Only transport-level failures are worth retrying inside a provider.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Network(_) | FetchError::Timeout { .. } => true,
            FetchError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FetchError::Malformed(err.to_string())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

/// One source of daily bars.
#[async_trait]
pub trait DataProvider: Send + Sync {
    fn name(&self) -> &str;

    /// False only for generated data.
    fn is_real(&self) -> bool {
        true
    }

    /// False when a required credential is absent.
    fn is_available(&self) -> bool {
        true
    }

    /// Upper bound for one `fetch` call, retries included.
    fn timeout(&self) -> Duration;

    /// Waits until the provider's request spacing allows another call.
    async fn ready(&self) {}

    /// Fetch up to `depth` of the most recent daily bars, oldest first.
    async fn fetch(&self, key: &SymbolKey, depth: usize) -> Result<PriceSeries, FetchError>;
}
