//! ATR (Average True Range) indicator

use crate::common::math;
use crate::models::bar::PriceBar;
use crate::models::indicators::AtrIndicator;

/// Calculate ATR (Average True Range)
///
/// Simple mean of the last `period` true ranges, not Wilder smoothing.
/// Needs `period + 1` bars because the first bar has no previous close.
pub fn calculate_atr(bars: &[PriceBar], period: usize) -> Option<AtrIndicator> {
    if period == 0 || bars.len() < period + 1 {
        return None;
    }

    let tr_values: Vec<f64> = bars
        .windows(2)
        .map(|w| math::true_range(w[1].high, w[1].low, w[0].close))
        .collect();

    let value = math::sma(&tr_values, period)?;

    Some(AtrIndicator { value, period })
}

/// Calculate ATR with default period (14)
pub fn calculate_atr_default(bars: &[PriceBar]) -> Option<AtrIndicator> {
    calculate_atr(bars, 14)
}
