//! Property tests for indicator invariants

use proptest::prelude::*;
use vcp_scanner::common::math;
use vcp_scanner::indicators::volatility::calculate_atr;
use vcp_scanner::models::bar::PriceBar;

use crate::fixtures::{first_day, weekdays};

/// (close, spread-above, spread-below) triples mapped onto valid bars.
fn bars_strategy() -> impl Strategy<Value = Vec<PriceBar>> {
    prop::collection::vec((1.0f64..10_000.0, 0.0f64..50.0, 0.0f64..50.0), 16..120).prop_map(
        |rows| {
            let dates = weekdays(first_day(), rows.len());
            rows.into_iter()
                .zip(dates)
                .map(|((close, up, down), date)| {
                    let low = (close - down).max(0.0);
                    PriceBar::new(date, close, close + up, low, close, 1_000.0)
                })
                .collect()
        },
    )
}

proptest! {
    #[test]
    fn ema_extends_incrementally(
        values in prop::collection::vec(0.01f64..1_000.0, 2..300),
        extra in 0.01f64..1_000.0,
        period in 1usize..50,
    ) {
        prop_assume!(values.len() >= period);
        let previous = math::ema(&values, period).unwrap();

        let mut extended = values.clone();
        extended.push(extra);
        let next = math::ema(&extended, period).unwrap();

        let expected = math::ema_step(previous, extra, math::smoothing(period));
        prop_assert!((next - expected).abs() <= 1e-9 * expected.abs().max(1.0));
    }

    #[test]
    fn atr_is_never_negative(bars in bars_strategy(), period in 1usize..15) {
        let atr = calculate_atr(&bars, period).unwrap();
        prop_assert!(atr.value >= 0.0);
        prop_assert!(atr.value.is_finite());
    }
}
