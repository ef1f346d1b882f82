//! Daily price bars and the validated series built from them.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Exchange a symbol is listed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    Kospi,
    Kosdaq,
}

impl Venue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Venue::Kospi => "kospi",
            Venue::Kosdaq => "kosdaq",
        }
    }

    /// Ticker suffix used by Yahoo-style symbol notation (`005930.KS`).
    pub fn exchange_suffix(&self) -> &'static str {
        match self {
            Venue::Kospi => "KS",
            Venue::Kosdaq => "KQ",
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Venue {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kospi" | "ks" => Ok(Venue::Kospi),
            "kosdaq" | "kq" => Ok(Venue::Kosdaq),
            other => Err(format!("unknown venue '{}'", other)),
        }
    }
}

/// A (symbol, venue) pair; the unit of work for a scan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolKey {
    pub symbol: String,
    pub venue: Venue,
}

impl SymbolKey {
    pub fn new(symbol: impl Into<String>, venue: Venue) -> Self {
        Self {
            symbol: symbol.into(),
            venue,
        }
    }

    /// `005930.KS` style ticker.
    pub fn ticker(&self) -> String {
        format!("{}.{}", self.symbol, self.venue.exchange_suffix())
    }
}

impl fmt::Display for SymbolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.venue, self.symbol)
    }
}

/// One trading day for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceBar {
    pub fn new(date: NaiveDate, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            date,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// `high >= max(open, close) >= min(open, close) >= low >= 0`, `volume >= 0`, all finite.
    pub fn is_sane(&self) -> bool {
        let fields = [self.open, self.high, self.low, self.close, self.volume];
        if fields.iter().any(|v| !v.is_finite()) {
            return false;
        }
        self.high >= self.open.max(self.close)
            && self.open.min(self.close) >= self.low
            && self.low >= 0.0
            && self.volume >= 0.0
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SeriesError {
    #[error("bar on {date} violates OHLC invariants")]
    InvalidBar { date: NaiveDate },

    #[error("dates not strictly increasing at {date}")]
    OutOfOrder { date: NaiveDate },
}

/// Ordered daily bars for one (symbol, venue) pair.
///
/// Only constructible through [`PriceSeries::new`], which enforces the bar
/// invariants and strictly increasing dates. There is no mutable access.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSeries {
    key: SymbolKey,
    bars: Vec<PriceBar>,
}

impl PriceSeries {
    pub fn new(key: SymbolKey, bars: Vec<PriceBar>) -> Result<Self, SeriesError> {
        for (i, bar) in bars.iter().enumerate() {
            if !bar.is_sane() {
                return Err(SeriesError::InvalidBar { date: bar.date });
            }
            if i > 0 && bars[i - 1].date >= bar.date {
                return Err(SeriesError::OutOfOrder { date: bar.date });
            }
        }
        Ok(Self { key, bars })
    }

    /// Sorts by date, drops duplicate dates (last one wins) and insane bars,
    /// then validates. Used by providers whose payloads are not guaranteed clean.
    pub fn from_unsorted(key: SymbolKey, mut bars: Vec<PriceBar>) -> Result<Self, SeriesError> {
        bars.retain(PriceBar::is_sane);
        bars.sort_by_key(|b| b.date);
        let mut deduped: Vec<PriceBar> = Vec::with_capacity(bars.len());
        for bar in bars {
            match deduped.last_mut() {
                Some(last) if last.date == bar.date => *last = bar,
                _ => deduped.push(bar),
            }
        }
        Self::new(key, deduped)
    }

    pub fn key(&self) -> &SymbolKey {
        &self.key
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&PriceBar> {
        self.bars.last()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.volume).collect()
    }

    /// Keep only the most recent `depth` bars.
    pub fn truncate_to_recent(mut self, depth: usize) -> Self {
        if self.bars.len() > depth {
            self.bars.drain(..self.bars.len() - depth);
        }
        self
    }
}
