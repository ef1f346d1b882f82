//! Deterministic price series shared by unit and integration tests.
//!
//! The default series is a steady uptrend whose last 21 bars trade in a
//! tighter range than the base before them, which passes every VCP filter.
#![allow(dead_code)]

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde_json::{json, Map, Value};
use vcp_scanner::models::bar::{PriceBar, PriceSeries, SymbolKey, Venue};

#[derive(Debug, Clone, Copy)]
pub struct Shape {
    pub bars: usize,
    pub start: f64,
    pub step: f64,
    /// Half of the high/low spread before the final 21 bars.
    pub wide: f64,
    /// Half of the high/low spread over the final 21 bars.
    pub tight: f64,
    pub volume: f64,
}

impl Default for Shape {
    fn default() -> Self {
        Self {
            bars: 300,
            start: 80.0,
            step: 0.4,
            wide: 3.0,
            tight: 1.5,
            volume: 100_000.0,
        }
    }
}

pub fn first_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 1, 2).unwrap()
}

/// `count` consecutive weekdays starting at `start`.
pub fn weekdays(start: NaiveDate, count: usize) -> Vec<NaiveDate> {
    let mut dates = Vec::with_capacity(count);
    let mut day = start;
    while dates.len() < count {
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            dates.push(day);
        }
        day += Duration::days(1);
    }
    dates
}

pub fn shaped_bars(shape: Shape) -> Vec<PriceBar> {
    let dates = weekdays(first_day(), shape.bars);
    (0..shape.bars)
        .map(|i| {
            let close = shape.start + shape.step * i as f64;
            let spread = if i >= shape.bars.saturating_sub(21) {
                shape.tight
            } else {
                shape.wide
            };
            PriceBar::new(
                dates[i],
                close - shape.step / 2.0,
                close + spread,
                close - spread,
                close,
                shape.volume,
            )
        })
        .collect()
}

pub fn key(symbol: &str) -> SymbolKey {
    SymbolKey::new(symbol, Venue::Kospi)
}

pub fn series(symbol: &str, bars: Vec<PriceBar>) -> PriceSeries {
    PriceSeries::new(key(symbol), bars).expect("fixture bars are valid")
}

/// Passes all twelve filters without a breakout.
pub fn vcp_bars() -> Vec<PriceBar> {
    shaped_bars(Shape::default())
}

pub fn vcp_series(symbol: &str) -> PriceSeries {
    series(symbol, vcp_bars())
}

/// Replaces bar `index` with a one-day move closing at `close`.
pub fn spike(mut bars: Vec<PriceBar>, index: usize, close: f64) -> Vec<PriceBar> {
    let bar = &mut bars[index];
    bar.open = close - 0.125;
    bar.high = close + 1.0;
    bar.low = bar.low.min(close - 1.0);
    bar.close = close;
    bars
}

/// Shape whose 52-week high is a spike 240 bars back.
pub fn boundary_shape() -> Shape {
    Shape {
        start: 75.25,
        step: 0.25,
        wide: 3.5,
        tight: 2.0,
        ..Shape::default()
    }
}

/// Last close sits exactly 25% below the 52-week high.
pub fn boundary_bars() -> Vec<PriceBar> {
    spike(shaped_bars(boundary_shape()), 60, 200.0)
}

/// Last bar closes above the prior 21-bar high on 1.8x average volume.
pub fn breakout_bars() -> Vec<PriceBar> {
    let mut bars = vcp_bars();
    let last = bars.last_mut().unwrap();
    last.close += 3.0;
    last.high = last.close + 1.5;
    last.open = last.close - 0.2;
    last.volume = 180_000.0;
    bars
}

/// Yahoo v8 chart payload for `bars`, timestamps at UTC midnight.
pub fn yahoo_chart_json(bars: &[PriceBar]) -> Value {
    let timestamps: Vec<i64> = bars
        .iter()
        .map(|b| b.date.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp())
        .collect();
    json!({
        "chart": {
            "result": [{
                "meta": { "gmtoffset": 0 },
                "timestamp": timestamps,
                "indicators": { "quote": [{
                    "open": bars.iter().map(|b| b.open).collect::<Vec<_>>(),
                    "high": bars.iter().map(|b| b.high).collect::<Vec<_>>(),
                    "low": bars.iter().map(|b| b.low).collect::<Vec<_>>(),
                    "close": bars.iter().map(|b| b.close).collect::<Vec<_>>(),
                    "volume": bars.iter().map(|b| b.volume).collect::<Vec<_>>(),
                }]}
            }],
            "error": null
        }
    })
}

/// Alpha Vantage TIME_SERIES_DAILY payload for `bars`.
pub fn alpha_vantage_json(bars: &[PriceBar]) -> Value {
    let mut daily = Map::new();
    for b in bars.iter().rev() {
        daily.insert(
            b.date.format("%Y-%m-%d").to_string(),
            json!({
                "1. open": b.open.to_string(),
                "2. high": b.high.to_string(),
                "3. low": b.low.to_string(),
                "4. close": b.close.to_string(),
                "5. volume": b.volume.to_string(),
            }),
        );
    }
    json!({
        "Meta Data": { "1. Information": "Daily Prices" },
        "Time Series (Daily)": Value::Object(daily),
    })
}
