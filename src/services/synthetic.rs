//! Generated daily bars, used as the last link of the provider chain.
//!
//! Keeps the pipeline running when no real source answers. The output is a
//! random walk with drift, not a market model.

use async_trait::async_trait;
use chrono::{Datelike, Duration as ChronoDuration, NaiveDate, Utc, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::Range;
use std::time::Duration;

use crate::models::bar::{PriceBar, PriceSeries, SymbolKey};
use crate::services::market_data::{DataProvider, FetchError};

const PROVIDER: &str = "synthetic";

/// Typical price ranges (KRW) for a few large caps.
const KNOWN_RANGES: &[(&str, Range<f64>)] = &[
    ("005930", 60_000.0..80_000.0),
    ("000660", 100_000.0..150_000.0),
    ("035420", 150_000.0..220_000.0),
    ("035720", 40_000.0..60_000.0),
    ("005380", 180_000.0..250_000.0),
];
const GENERIC_RANGE: Range<f64> = 10_000.0..100_000.0;
const VOLATILITY_RANGE: Range<f64> = 0.015..0.04;
/// Daily turnover (KRW) the volume model is anchored to.
const BASE_TURNOVER: f64 = 5_000_000_000.0;

#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    /// Mean daily return added to every step.
    pub drift: f64,
    /// Fixed seed for reproducible output; entropy when `None`.
    pub seed: Option<u64>,
    /// Last generated date; today (UTC) when `None`.
    pub end_date: Option<NaiveDate>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            drift: 0.0005,
            seed: None,
            end_date: None,
        }
    }
}

pub struct SyntheticProvider {
    config: SyntheticConfig,
}

impl SyntheticProvider {
    pub fn new(config: SyntheticConfig) -> Self {
        Self { config }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::new(SyntheticConfig {
            seed: Some(seed),
            ..SyntheticConfig::default()
        })
    }

    fn rng_for(&self, key: &SymbolKey) -> StdRng {
        match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ symbol_hash(key)),
            None => StdRng::from_entropy(),
        }
    }

    /// Generate exactly `depth` weekday bars ending at the configured date.
    pub fn generate(&self, key: &SymbolKey, depth: usize) -> Result<PriceSeries, FetchError> {
        let mut rng = self.rng_for(key);
        let end = self
            .config
            .end_date
            .unwrap_or_else(|| Utc::now().date_naive());
        let dates = weekdays_ending(end, depth);

        let range = KNOWN_RANGES
            .iter()
            .find(|(symbol, _)| *symbol == key.symbol)
            .map(|(_, range)| range.clone())
            .unwrap_or(GENERIC_RANGE);
        let base_price = rng.gen_range(range);
        let volatility = rng.gen_range(VOLATILITY_RANGE);
        let base_volume = BASE_TURNOVER / base_price;

        let mut bars = Vec::with_capacity(depth);
        let mut previous_close = base_price;
        for date in dates {
            let shock = rng.gen_range(-1.0..=1.0) * volatility;
            let close = (previous_close * (1.0 + self.config.drift + shock)).max(1.0);
            let open = (previous_close * (1.0 + rng.gen_range(-0.5..=0.5) * volatility)).max(1.0);
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..=0.5) * volatility);
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..=0.5) * volatility);
            // Cheaper names trade more shares.
            let volume = (base_volume * (base_price / close) * rng.gen_range(0.5..1.5)).round();

            bars.push(PriceBar::new(date, open, high, low, close, volume));
            previous_close = close;
        }

        Ok(PriceSeries::new(key.clone(), bars)?)
    }
}

#[async_trait]
impl DataProvider for SyntheticProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn is_real(&self) -> bool {
        false
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(5)
    }

    async fn fetch(&self, key: &SymbolKey, depth: usize) -> Result<PriceSeries, FetchError> {
        self.generate(key, depth)
    }
}

/// FNV-1a over the symbol and venue, stable across builds.
fn symbol_hash(key: &SymbolKey) -> u64 {
    key.symbol
        .bytes()
        .chain(key.venue.as_str().bytes())
        .fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
            (hash ^ byte as u64).wrapping_mul(0x0100_0000_01b3)
        })
}

/// The `count` most recent weekdays up to and including `end`, oldest first.
fn weekdays_ending(end: NaiveDate, count: usize) -> Vec<NaiveDate> {
    let mut dates = Vec::with_capacity(count);
    let mut day = end;
    while dates.len() < count {
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            dates.push(day);
        }
        day -= ChronoDuration::days(1);
    }
    dates.reverse();
    dates
}
