//! Environment-driven configuration and the symbol universe file.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::core::orchestrator::ScannerConfig;
use crate::models::bar::{SymbolKey, Venue};
use crate::services::alpha_vantage::{AlphaVantageConfig, AlphaVantageProvider, ALPHA_VANTAGE_BASE_URL};
use crate::services::chain::{ChainConfig, ProviderChain};
use crate::services::market_data::{DataProvider, FetchError};
use crate::services::synthetic::{SyntheticConfig, SyntheticProvider};
use crate::services::yahoo::{YahooConfig, YahooProvider, YAHOO_BASE_URL};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("failed to read universe file {path}: {source}")]
    UniverseRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse universe file: {0}")]
    UniverseParse(#[from] toml::de::Error),
}

/// `APP_ENV`, defaulting to `sandbox`.
pub fn get_environment() -> String {
    env::var("APP_ENV").unwrap_or_else(|_| "sandbox".to_string())
}

pub fn is_production() -> bool {
    matches!(get_environment().as_str(), "production" | "prod")
}

#[derive(Debug, Clone)]
pub struct ScannerSettings {
    pub database_url: Option<String>,
    pub universe_path: PathBuf,
    pub alpha_vantage_api_key: Option<SecretString>,
    pub batch_size: usize,
    pub min_bars: usize,
    pub target_bars: usize,
    pub batch_delay: Duration,
    pub throttled_delay: Duration,
    pub error_rate_threshold: f64,
    pub yahoo_base_url: String,
    pub yahoo_timeout: Duration,
    pub alpha_vantage_base_url: String,
    pub alpha_vantage_timeout: Duration,
    pub alpha_vantage_spacing: Duration,
    pub synthetic_fallback: bool,
    pub synthetic_drift: f64,
    pub scan_cron: Option<String>,
    pub scan_on_start: bool,
    pub port: u16,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            database_url: None,
            universe_path: PathBuf::from("universe.toml"),
            alpha_vantage_api_key: None,
            batch_size: 20,
            min_bars: 200,
            target_bars: 300,
            batch_delay: Duration::from_millis(500),
            throttled_delay: Duration::from_millis(3000),
            error_rate_threshold: 0.10,
            yahoo_base_url: YAHOO_BASE_URL.to_string(),
            yahoo_timeout: Duration::from_secs(10),
            alpha_vantage_base_url: ALPHA_VANTAGE_BASE_URL.to_string(),
            alpha_vantage_timeout: Duration::from_secs(15),
            alpha_vantage_spacing: Duration::from_millis(12_000),
            synthetic_fallback: true,
            synthetic_drift: 0.0005,
            scan_cron: None,
            scan_on_start: false,
            port: 8080,
        }
    }
}

impl ScannerSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds settings from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let d = Self::default();

        let settings = Self {
            database_url: get("DATABASE_URL"),
            universe_path: get("UNIVERSE_PATH").map(PathBuf::from).unwrap_or(d.universe_path),
            alpha_vantage_api_key: get("ALPHA_VANTAGE_API_KEY")
                .map(|key| SecretString::new(key.into_boxed_str())),
            batch_size: parse(&get, "SCAN_BATCH_SIZE", d.batch_size)?,
            min_bars: parse(&get, "SCAN_MIN_BARS", d.min_bars)?,
            target_bars: parse(&get, "SCAN_TARGET_BARS", d.target_bars)?,
            batch_delay: millis(&get, "SCAN_BATCH_DELAY_MS", d.batch_delay)?,
            throttled_delay: millis(&get, "SCAN_THROTTLED_DELAY_MS", d.throttled_delay)?,
            error_rate_threshold: parse(&get, "SCAN_ERROR_RATE_THRESHOLD", d.error_rate_threshold)?,
            yahoo_base_url: get("YAHOO_BASE_URL").unwrap_or(d.yahoo_base_url),
            yahoo_timeout: secs(&get, "YAHOO_TIMEOUT_SECS", d.yahoo_timeout)?,
            alpha_vantage_base_url: get("ALPHA_VANTAGE_BASE_URL").unwrap_or(d.alpha_vantage_base_url),
            alpha_vantage_timeout: secs(&get, "ALPHA_VANTAGE_TIMEOUT_SECS", d.alpha_vantage_timeout)?,
            alpha_vantage_spacing: millis(&get, "ALPHA_VANTAGE_SPACING_MS", d.alpha_vantage_spacing)?,
            synthetic_fallback: parse(&get, "SYNTHETIC_FALLBACK", d.synthetic_fallback)?,
            synthetic_drift: parse(&get, "SYNTHETIC_DRIFT", d.synthetic_drift)?,
            scan_cron: get("SCAN_CRON"),
            scan_on_start: parse(&get, "SCAN_ON_START", d.scan_on_start)?,
            port: parse(&get, "PORT", d.port)?,
        };
        settings.validate()
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.batch_size == 0 {
            return Err(invalid("SCAN_BATCH_SIZE", "0", "must be at least 1"));
        }
        if self.target_bars < self.min_bars {
            return Err(invalid(
                "SCAN_TARGET_BARS",
                &self.target_bars.to_string(),
                "must not be below SCAN_MIN_BARS",
            ));
        }
        if !(0.0..=1.0).contains(&self.error_rate_threshold) {
            return Err(invalid(
                "SCAN_ERROR_RATE_THRESHOLD",
                &self.error_rate_threshold.to_string(),
                "must be within [0, 1]",
            ));
        }
        Ok(self)
    }

    pub fn chain_config(&self) -> ChainConfig {
        ChainConfig {
            min_depth: self.min_bars,
            target_depth: self.target_bars,
        }
    }

    pub fn scanner_config(&self) -> ScannerConfig {
        ScannerConfig {
            batch_size: self.batch_size,
            batch_delay: self.batch_delay,
            throttled_delay: self.throttled_delay,
            error_rate_threshold: self.error_rate_threshold,
        }
    }

    /// Yahoo, then Alpha Vantage, then synthetic when fallback is enabled.
    pub fn provider_chain(&self) -> Result<ProviderChain, FetchError> {
        let mut providers: Vec<Arc<dyn DataProvider>> = vec![
            Arc::new(YahooProvider::new(YahooConfig {
                base_url: self.yahoo_base_url.clone(),
                timeout: self.yahoo_timeout,
                ..YahooConfig::default()
            })?),
            Arc::new(AlphaVantageProvider::new(AlphaVantageConfig {
                base_url: self.alpha_vantage_base_url.clone(),
                api_key: self.alpha_vantage_api_key.clone(),
                timeout: self.alpha_vantage_timeout,
                spacing: self.alpha_vantage_spacing,
                ..AlphaVantageConfig::default()
            })?),
        ];
        if self.synthetic_fallback {
            providers.push(Arc::new(SyntheticProvider::new(SyntheticConfig {
                drift: self.synthetic_drift,
                ..SyntheticConfig::default()
            })));
        }
        Ok(ProviderChain::new(providers, self.chain_config()))
    }
}

fn invalid(key: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| invalid(key, &raw, &e.to_string())),
        None => Ok(default),
    }
}

fn millis<G>(get: &G, key: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    parse(get, key, default.as_millis() as u64).map(Duration::from_millis)
}

fn secs<G>(get: &G, key: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    parse(get, key, default.as_secs()).map(Duration::from_secs)
}

/// One `[[symbols]]` entry of the universe file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniverseEntry {
    pub symbol: String,
    pub venue: Venue,
    #[serde(default)]
    pub name: Option<String>,
}

/// The configured scan universe.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Universe {
    #[serde(default)]
    pub symbols: Vec<UniverseEntry>,
}

impl Universe {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::UniverseRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn keys(&self) -> Vec<SymbolKey> {
        self.symbols
            .iter()
            .map(|e| SymbolKey::new(e.symbol.clone(), e.venue))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn count_by_venue(&self, venue: Venue) -> usize {
        self.symbols.iter().filter(|e| e.venue == venue).count()
    }
}
