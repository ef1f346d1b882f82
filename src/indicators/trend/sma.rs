//! SMA (Simple Moving Average) indicator

use crate::common::math;
use crate::models::bar::PriceBar;
use crate::models::indicators::SmaIndicator;

/// Mean close over the trailing `period` bars.
pub fn calculate_sma(bars: &[PriceBar], period: usize) -> Option<SmaIndicator> {
    let window = math::tail(bars, period);
    if period == 0 || window.len() < period {
        return None;
    }
    let closes: Vec<f64> = window.iter().map(|b| b.close).collect();
    let value = math::mean(&closes)?;

    Some(SmaIndicator { value, period })
}
