//! EMA (Exponential Moving Average) indicator

use crate::common::math;
use crate::models::bar::PriceBar;
use crate::models::indicators::EmaIndicator;

/// Calculate EMA of closes for a specific period.
///
/// Smoothing runs over every bar handed in, seeded with the first close, so the
/// result depends on how much history the caller passes.
pub fn calculate_ema(bars: &[PriceBar], period: usize) -> Option<EmaIndicator> {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let value = math::ema(&closes, period)?;

    Some(EmaIndicator { value, period })
}

/// Calculate multiple EMAs at once
pub fn calculate_emas(bars: &[PriceBar], periods: &[usize]) -> Vec<EmaIndicator> {
    periods
        .iter()
        .filter_map(|&period| calculate_ema(bars, period))
        .collect()
}

/// True when every EMA is strictly above the next slower one.
///
/// `periods` must be ordered fast to slow. Any EMA that cannot be computed
/// makes the stack fail.
pub fn is_bullish_stack(bars: &[PriceBar], periods: &[usize]) -> bool {
    let emas = calculate_emas(bars, periods);
    emas.len() == periods.len() && emas.windows(2).all(|w| w[0].value > w[1].value)
}
