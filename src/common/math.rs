//! Slice-level math used by the indicator library and the classifier.
//!
//! Every function here is pure and returns `None` instead of panicking when the
//! input is too short for the requested window.

/// Arithmetic mean of a slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Mean of the last `period` values.
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    mean(&values[values.len() - period..])
}

/// Exponential moving average over the whole slice.
///
/// Seeded with `values[0]` and smoothed with `k = 2 / (period + 1)` across
/// every element, not only the trailing window. Long histories therefore
/// carry weight from the first bar onward; this is intentional and differs
/// from the textbook SMA-seeded EMA.
pub fn ema(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let k = smoothing(period);
    let mut current = values[0];
    for &value in &values[1..] {
        current = ema_step(current, value, k);
    }
    Some(current)
}

/// Smoothing factor used by [`ema`].
pub fn smoothing(period: usize) -> f64 {
    2.0 / (period as f64 + 1.0)
}

/// One recursive EMA update.
pub fn ema_step(previous: f64, value: f64, k: f64) -> f64 {
    value * k + previous * (1.0 - k)
}

/// True range of a bar given the previous close.
pub fn true_range(high: f64, low: f64, previous_close: f64) -> f64 {
    (high - low)
        .max((high - previous_close).abs())
        .max((low - previous_close).abs())
}

/// Largest value in the slice, `None` when empty.
pub fn max(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::max)
}

/// Smallest value in the slice, `None` when empty.
pub fn min(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::min)
}

/// The trailing `count` elements (or the whole slice if shorter).
pub fn tail<T>(values: &[T], count: usize) -> &[T] {
    &values[values.len().saturating_sub(count)..]
}
