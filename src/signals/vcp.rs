//! Volatility Contraction Pattern classifier.
//!
//! Twelve filters run in a fixed order and stop at the first failure. Each step
//! reads the series through an [`IndicatorSet`] and writes what it computed
//! into [`Computed`], which later steps and the final [`MatchRecord`] reuse.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::common::math;
use crate::models::bar::PriceSeries;
use crate::models::indicators::IndicatorSet;
use crate::models::scan::MatchRecord;

/// Fixed thresholds of the pattern.
pub struct VcpThresholds;

impl VcpThresholds {
    pub const MIN_PRICE: f64 = 50.0;
    pub const MIN_TURNOVER: f64 = 5_000_000.0;
    pub const HIGH_LOOKBACK: usize = 252;
    pub const MAX_DRAWDOWN_PCT: f64 = -25.0;
    pub const EMA_PERIODS: [usize; 5] = [10, 21, 50, 150, 200];
    pub const EMA21_TOLERANCE: f64 = 0.95;
    pub const ATR_PERIOD: usize = 14;
    pub const ATR_RECENT_BARS: usize = 21;
    pub const ATR_BASE_BARS: usize = 50;
    pub const ATR_CONTRACTION: f64 = 0.8;
    pub const VOLUME_AVG10_MAX: f64 = 1.2;
    pub const VOLUME_SPIKE_MAX: f64 = 2.0;
    pub const RANGE_BARS: usize = 21;
    pub const RANGE_MIN: f64 = 0.05;
    pub const RANGE_MAX: f64 = 0.20;
    pub const CUP_BARS: usize = 200;
    pub const CUP_MIN: f64 = 0.15;
    pub const CUP_MAX: f64 = 0.65;
    pub const STAGE_TWO_PREMIUM: f64 = 1.10;
    pub const RS_BARS: usize = 200;
    pub const RS_MIN: f64 = 0.20;
    pub const BREAKOUT_BARS: usize = 21;
    pub const BREAKOUT_VOLUME: f64 = 1.5;
    pub const TIGHT_CLOSES: usize = 5;
    pub const TIGHT_CLOSE_RATIO: f64 = 1.15;
    pub const VOLUME_TREND_MAX: f64 = 1.5;
}

/// The twelve filters, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VcpFilter {
    MinPrice,
    MinTurnover,
    NearHigh,
    TrendStructure,
    VolatilityContraction,
    VolumeContraction,
    ConsolidationRange,
    CupDepth,
    StageTwo,
    RelativeStrength,
    Breakout,
    QualityGate,
}

impl VcpFilter {
    pub const ALL: [VcpFilter; 12] = [
        VcpFilter::MinPrice,
        VcpFilter::MinTurnover,
        VcpFilter::NearHigh,
        VcpFilter::TrendStructure,
        VcpFilter::VolatilityContraction,
        VcpFilter::VolumeContraction,
        VcpFilter::ConsolidationRange,
        VcpFilter::CupDepth,
        VcpFilter::StageTwo,
        VcpFilter::RelativeStrength,
        VcpFilter::Breakout,
        VcpFilter::QualityGate,
    ];

    /// 1-based position in the evaluation order.
    pub fn number(&self) -> usize {
        Self::ALL.iter().position(|f| f == self).map_or(0, |i| i + 1)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VcpFilter::MinPrice => "min_price",
            VcpFilter::MinTurnover => "min_turnover",
            VcpFilter::NearHigh => "near_high",
            VcpFilter::TrendStructure => "trend_structure",
            VcpFilter::VolatilityContraction => "volatility_contraction",
            VcpFilter::VolumeContraction => "volume_contraction",
            VcpFilter::ConsolidationRange => "consolidation_range",
            VcpFilter::CupDepth => "cup_depth",
            VcpFilter::StageTwo => "stage_two",
            VcpFilter::RelativeStrength => "relative_strength",
            VcpFilter::Breakout => "breakout",
            VcpFilter::QualityGate => "quality_gate",
        }
    }

    /// Informational filters record a value but never reject.
    pub fn is_informational(&self) -> bool {
        matches!(self, VcpFilter::Breakout)
    }
}

impl fmt::Display for VcpFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a series produced no match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    InsufficientHistory { bars: usize, required: usize },
    Filter(VcpFilter),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::InsufficientHistory { bars, required } => {
                write!(f, "insufficient history: {} bars, {} required", bars, required)
            }
            Rejection::Filter(filter) => write!(f, "rejected by {}", filter),
        }
    }
}

/// Observer notified once per evaluated filter.
///
/// Informational filters always report `passed`; their outcome lives on the
/// match record.
pub trait FilterTrace {
    fn on_filter(&mut self, filter: VcpFilter, passed: bool);
}

/// Discards every notification.
pub struct NoTrace;

impl FilterTrace for NoTrace {
    fn on_filter(&mut self, _filter: VcpFilter, _passed: bool) {}
}

/// Keeps every notification in order.
#[derive(Debug, Default, Clone)]
pub struct RecordingTrace {
    pub steps: Vec<(VcpFilter, bool)>,
}

impl RecordingTrace {
    pub fn evaluated(&self) -> usize {
        self.steps.len()
    }

    pub fn failed_at(&self) -> Option<VcpFilter> {
        self.steps.iter().find(|(_, passed)| !passed).map(|(f, _)| *f)
    }
}

impl FilterTrace for RecordingTrace {
    fn on_filter(&mut self, filter: VcpFilter, passed: bool) {
        self.steps.push((filter, passed));
    }
}

/// Values computed while the filters run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Computed {
    pub close: f64,
    pub volume: f64,
    pub high52: f64,
    pub pct_from_high: f64,
    pub ema10: f64,
    pub ema21: f64,
    pub ema50: f64,
    pub ema150: f64,
    pub ema200: f64,
    pub atr_current: f64,
    pub atr_previous: f64,
    pub volume_avg10: f64,
    pub volume_avg20: f64,
    pub volume_avg50: f64,
    pub consolidation_ratio: f64,
    pub cup_depth: f64,
    pub sma200: f64,
    pub relative_strength: f64,
    pub breakout: bool,
}

impl Computed {
    pub fn contraction_ratio(&self) -> f64 {
        if self.atr_previous > 0.0 {
            self.atr_current / self.atr_previous
        } else {
            0.0
        }
    }
}

pub const DEFAULT_MIN_BARS: usize = 200;

/// Stateless twelve-step classifier.
#[derive(Debug, Clone, Copy)]
pub struct VcpClassifier {
    min_bars: usize,
}

impl Default for VcpClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_BARS)
    }
}

impl VcpClassifier {
    pub fn new(min_bars: usize) -> Self {
        Self { min_bars }
    }

    pub fn min_bars(&self) -> usize {
        self.min_bars
    }

    pub fn classify(&self, series: &PriceSeries) -> Option<MatchRecord> {
        self.evaluate(series, &mut NoTrace).ok()
    }

    pub fn evaluate(
        &self,
        series: &PriceSeries,
        trace: &mut dyn FilterTrace,
    ) -> Result<MatchRecord, Rejection> {
        if series.len() < self.min_bars || series.is_empty() {
            return Err(Rejection::InsufficientHistory {
                bars: series.len(),
                required: self.min_bars,
            });
        }

        let view = IndicatorSet::new(series);
        let mut computed = Computed::default();

        for filter in VcpFilter::ALL {
            if filter.is_informational() {
                // Sets `computed.breakout`; the outcome never gates the match.
                apply(filter, &view, &mut computed);
                trace.on_filter(filter, true);
                continue;
            }
            let passed = apply(filter, &view, &mut computed).unwrap_or(false);
            trace.on_filter(filter, passed);
            if !passed {
                return Err(Rejection::Filter(filter));
            }
        }

        let Some(last) = series.last() else {
            return Err(Rejection::InsufficientHistory {
                bars: 0,
                required: self.min_bars,
            });
        };

        Ok(MatchRecord {
            symbol: series.key().symbol.clone(),
            venue: series.key().venue,
            close: computed.close,
            volume: computed.volume,
            pct_from_high: computed.pct_from_high,
            atr14: computed.atr_current,
            ema50: computed.ema50,
            ema150: computed.ema150,
            ema200: computed.ema200,
            volume_avg20: computed.volume_avg20,
            breakout_signal: computed.breakout,
            contraction_ratio: computed.contraction_ratio(),
            consolidation_ratio: computed.consolidation_ratio,
            bar_date: last.date,
            scan_date: last.date,
        })
    }
}

/// Runs one filter. `None` means a required value could not be computed,
/// which the caller treats as a failure.
fn apply(filter: VcpFilter, view: &IndicatorSet<'_>, c: &mut Computed) -> Option<bool> {
    type T = VcpThresholds;
    let closes = view.closes();
    let volumes = view.volumes();
    let bars = view.bars();
    let n = closes.len();

    match filter {
        VcpFilter::MinPrice => {
            c.close = *closes.last()?;
            c.volume = *volumes.last()?;
            Some(c.close >= T::MIN_PRICE)
        }
        VcpFilter::MinTurnover => Some(c.close * c.volume >= T::MIN_TURNOVER),
        VcpFilter::NearHigh => {
            c.high52 = math::max(math::tail(closes, T::HIGH_LOOKBACK))?;
            if c.high52 <= 0.0 {
                return None;
            }
            c.pct_from_high = (c.close - c.high52) / c.high52 * 100.0;
            Some(c.pct_from_high >= T::MAX_DRAWDOWN_PCT)
        }
        VcpFilter::TrendStructure => {
            let [p10, p21, p50, p150, p200] = T::EMA_PERIODS;
            c.ema10 = view.ema(p10)?;
            c.ema21 = view.ema(p21)?;
            c.ema50 = view.ema(p50)?;
            c.ema150 = view.ema(p150)?;
            c.ema200 = view.ema(p200)?;
            let stacked =
                c.ema10 > c.ema21 && c.ema21 > c.ema50 && c.ema50 > c.ema150 && c.ema150 > c.ema200;
            Some(stacked && c.close >= c.ema21 * T::EMA21_TOLERANCE)
        }
        VcpFilter::VolatilityContraction => {
            if n < T::ATR_BASE_BARS {
                return None;
            }
            let recent = IndicatorSet::from_bars(&bars[n - T::ATR_RECENT_BARS..]);
            let base = IndicatorSet::from_bars(&bars[n - T::ATR_BASE_BARS..n - T::ATR_RECENT_BARS]);
            c.atr_current = recent.atr(T::ATR_PERIOD)?;
            c.atr_previous = base.atr(T::ATR_PERIOD)?;
            Some(c.atr_current < c.atr_previous * T::ATR_CONTRACTION)
        }
        VcpFilter::VolumeContraction => {
            c.volume_avg10 = view.volume_avg(10)?;
            c.volume_avg20 = view.volume_avg(20)?;
            Some(
                c.volume_avg10 <= T::VOLUME_AVG10_MAX * c.volume_avg20
                    && c.volume <= T::VOLUME_SPIKE_MAX * c.volume_avg20,
            )
        }
        VcpFilter::ConsolidationRange => {
            let window = math::tail(bars, T::RANGE_BARS);
            let high = window.iter().map(|b| b.high).reduce(f64::max)?;
            let low = window.iter().map(|b| b.low).reduce(f64::min)?;
            if c.close <= 0.0 {
                return None;
            }
            c.consolidation_ratio = (high - low) / c.close;
            Some((T::RANGE_MIN..=T::RANGE_MAX).contains(&c.consolidation_ratio))
        }
        VcpFilter::CupDepth => {
            let low = math::min(math::tail(closes, T::CUP_BARS))?;
            c.cup_depth = (c.high52 - low) / c.high52;
            Some((T::CUP_MIN..=T::CUP_MAX).contains(&c.cup_depth))
        }
        VcpFilter::StageTwo => {
            c.sma200 = view.sma(200)?;
            Some(c.close >= c.sma200 * T::STAGE_TWO_PREMIUM)
        }
        VcpFilter::RelativeStrength => {
            let anchor = *closes.get(n.checked_sub(T::RS_BARS)?)?;
            if anchor <= 0.0 {
                return None;
            }
            c.relative_strength = (c.close - anchor) / anchor;
            Some(c.relative_strength >= T::RS_MIN)
        }
        VcpFilter::Breakout => {
            let start = n.checked_sub(T::BREAKOUT_BARS + 1)?;
            let prior_high = bars[start..n - 1].iter().map(|b| b.high).reduce(f64::max)?;
            c.breakout =
                c.close > prior_high && c.volume > T::BREAKOUT_VOLUME * c.volume_avg20;
            Some(c.breakout)
        }
        VcpFilter::QualityGate => {
            let last5 = math::tail(closes, T::TIGHT_CLOSES);
            let hi = math::max(last5)?;
            let lo = math::min(last5)?;
            c.volume_avg50 = view.volume_avg(50)?;
            if lo <= 0.0 || c.volume_avg50 <= 0.0 {
                return None;
            }
            Some(
                hi / lo <= T::TIGHT_CLOSE_RATIO
                    && c.volume_avg20 / c.volume_avg50 <= T::VOLUME_TREND_MAX,
            )
        }
    }
}
