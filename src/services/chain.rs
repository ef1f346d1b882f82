//! Ordered provider fallback.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::models::bar::{PriceSeries, SymbolKey};
use crate::services::market_data::{DataProvider, FetchError};

#[derive(Debug, Clone, Copy)]
pub struct ChainConfig {
    /// Bars a provider must return to count as a success.
    pub min_depth: usize,
    /// Bars requested from each provider.
    pub target_depth: usize,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            min_depth: 200,
            target_depth: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Skipped,
    Success { bars: usize },
    Short { bars: usize },
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderAttempt {
    pub provider: String,
    pub outcome: AttemptOutcome,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub series: PriceSeries,
    pub provider: String,
    pub is_real: bool,
    pub attempts: Vec<ProviderAttempt>,
}

/// Providers tried in order until one returns enough history.
pub struct ProviderChain {
    providers: Vec<Arc<dyn DataProvider>>,
    config: ChainConfig,
}

impl ProviderChain {
    pub fn new(providers: Vec<Arc<dyn DataProvider>>, config: ChainConfig) -> Self {
        Self { providers, config }
    }

    pub fn config(&self) -> ChainConfig {
        self.config
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// First provider returning `min_depth` bars wins.
    ///
    /// When every provider falls short, the longest short real series is
    /// returned so the caller can count it as insufficient history. Only when
    /// nothing usable came back is the chain exhausted.
    pub async fn fetch(&self, key: &SymbolKey) -> Result<FetchOutcome, FetchError> {
        let mut attempts = Vec::with_capacity(self.providers.len());
        let mut best_partial: Option<(PriceSeries, String, bool)> = None;

        for provider in &self.providers {
            let name = provider.name().to_string();
            if !provider.is_available() {
                debug!(provider = %name, symbol = %key, "provider unavailable, skipping");
                attempts.push(ProviderAttempt {
                    provider: name,
                    outcome: AttemptOutcome::Skipped,
                    elapsed: Duration::ZERO,
                });
                continue;
            }

            provider.ready().await;
            let started = Instant::now();
            let limit = provider.timeout();
            let result = match tokio::time::timeout(limit, provider.fetch(key, self.config.target_depth)).await
            {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout {
                    provider: name.clone(),
                    after: limit,
                }),
            };
            let elapsed = started.elapsed();

            match result {
                Ok(series) if series.len() >= self.config.min_depth => {
                    debug!(provider = %name, symbol = %key, bars = series.len(), "fetched series");
                    attempts.push(ProviderAttempt {
                        provider: name.clone(),
                        outcome: AttemptOutcome::Success { bars: series.len() },
                        elapsed,
                    });
                    return Ok(FetchOutcome {
                        series,
                        provider: name,
                        is_real: provider.is_real(),
                        attempts,
                    });
                }
                Ok(series) => {
                    let err = FetchError::InsufficientHistory {
                        provider: name.clone(),
                        bars: series.len(),
                        required: self.config.min_depth,
                    };
                    warn!(provider = %name, symbol = %key, error = %err, "short series");
                    attempts.push(ProviderAttempt {
                        provider: name.clone(),
                        outcome: AttemptOutcome::Short { bars: series.len() },
                        elapsed,
                    });
                    let longer = best_partial
                        .as_ref()
                        .map_or(true, |(best, _, _)| series.len() > best.len());
                    if provider.is_real() && longer && !series.is_empty() {
                        best_partial = Some((series, name, provider.is_real()));
                    }
                }
                Err(err) => {
                    warn!(provider = %name, symbol = %key, error = %err, "provider failed");
                    attempts.push(ProviderAttempt {
                        provider: name,
                        outcome: AttemptOutcome::Failed(err.to_string()),
                        elapsed,
                    });
                }
            }
        }

        match best_partial {
            Some((series, provider, is_real)) => Ok(FetchOutcome {
                series,
                provider,
                is_real,
                attempts,
            }),
            None => Err(FetchError::Exhausted(key.to_string())),
        }
    }
}
