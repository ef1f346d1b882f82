//! Unit tests for EMA and SMA indicators

use vcp_scanner::common::math;
use vcp_scanner::indicators::trend::{calculate_ema, calculate_emas, calculate_sma, is_bullish_stack};
use vcp_scanner::models::bar::PriceBar;

use crate::fixtures::{shaped_bars, Shape};

fn flat_bars(count: usize, price: f64) -> Vec<PriceBar> {
    shaped_bars(Shape {
        bars: count,
        start: price,
        step: 0.0,
        ..Shape::default()
    })
}

#[test]
fn test_ema_insufficient_data() {
    let bars = flat_bars(10, 100.0);
    assert!(calculate_ema(&bars, 20).is_none());
}

#[test]
fn test_ema_of_constant_series_is_constant() {
    let bars = flat_bars(60, 100.0);
    let ema = calculate_ema(&bars, 21).unwrap();
    assert_eq!(ema.period, 21);
    assert!((ema.value - 100.0).abs() < 1e-9);
}

#[test]
fn test_ema_uses_full_history() {
    // A seed far from the trailing window still pulls the result down.
    let mut closes = vec![10.0];
    closes.extend(std::iter::repeat(100.0).take(29));
    let full = math::ema(&closes, 10).unwrap();
    let window = math::ema(&closes[20..], 10).unwrap();
    assert!(full < window);
    assert_eq!(window, 100.0);
}

#[test]
fn test_calculate_multiple_emas_skips_long_periods() {
    let bars = flat_bars(100, 50.0);
    let emas = calculate_emas(&bars, &[10, 21, 50, 150]);
    assert_eq!(emas.iter().map(|e| e.period).collect::<Vec<_>>(), vec![10, 21, 50]);
}

#[test]
fn test_bullish_stack_on_uptrend() {
    let bars = shaped_bars(Shape::default());
    assert!(is_bullish_stack(&bars, &[10, 21, 50, 150, 200]));

    let mut falling = bars.clone();
    falling.reverse();
    // Reversed dates are irrelevant to the EMA math; closes now fall.
    assert!(!is_bullish_stack(&falling, &[10, 21, 50, 150, 200]));
}

#[test]
fn test_bullish_stack_needs_every_ema() {
    let bars = shaped_bars(Shape {
        bars: 120,
        ..Shape::default()
    });
    assert!(!is_bullish_stack(&bars, &[10, 21, 50, 150, 200]));
}

#[test]
fn test_sma_uses_trailing_window() {
    let bars = shaped_bars(Shape {
        bars: 10,
        start: 1.0,
        step: 1.0,
        ..Shape::default()
    });
    let sma = calculate_sma(&bars, 4).unwrap();
    assert_eq!(sma.value, 8.5);
    assert!(calculate_sma(&bars, 11).is_none());
    assert!(calculate_sma(&bars, 0).is_none());
}
