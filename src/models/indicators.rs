use crate::common::math;
use crate::indicators::volatility::calculate_atr;
use crate::models::bar::{PriceBar, PriceSeries};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmaIndicator {
    pub value: f64,
    pub period: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmaIndicator {
    pub value: f64,
    pub period: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AtrIndicator {
    pub value: f64,
    pub period: usize,
}

/// Point-in-time indicator values derived from one series.
///
/// Nothing is precomputed beyond the column extraction: each accessor runs
/// the underlying indicator on demand so callers that stop early pay only for
/// what they asked for. Never persisted; identical input gives identical output.
#[derive(Debug, Clone)]
pub struct IndicatorSet<'a> {
    bars: &'a [PriceBar],
    closes: Vec<f64>,
    volumes: Vec<f64>,
}

impl<'a> IndicatorSet<'a> {
    pub fn new(series: &'a PriceSeries) -> Self {
        Self::from_bars(series.bars())
    }

    pub fn from_bars(bars: &'a [PriceBar]) -> Self {
        Self {
            bars,
            closes: bars.iter().map(|b| b.close).collect(),
            volumes: bars.iter().map(|b| b.volume).collect(),
        }
    }

    pub fn bars(&self) -> &'a [PriceBar] {
        self.bars
    }

    pub fn closes(&self) -> &[f64] {
        &self.closes
    }

    pub fn volumes(&self) -> &[f64] {
        &self.volumes
    }

    pub fn ema(&self, period: usize) -> Option<f64> {
        math::ema(&self.closes, period)
    }

    pub fn sma(&self, period: usize) -> Option<f64> {
        math::sma(&self.closes, period)
    }

    pub fn atr(&self, period: usize) -> Option<f64> {
        calculate_atr(self.bars, period).map(|a| a.value)
    }

    /// Mean volume over the trailing `days` bars.
    pub fn volume_avg(&self, days: usize) -> Option<f64> {
        math::sma(&self.volumes, days)
    }
}
