//! Shared data models spanning the engine layers.

pub mod bar;
pub mod indicators;
pub mod scan;

pub use bar::{PriceBar, PriceSeries, SeriesError, SymbolKey, Venue};
pub use indicators::{AtrIndicator, EmaIndicator, IndicatorSet, SmaIndicator};
pub use scan::{MatchRecord, ScanCounts, ScanMode, ScanRun, ScanStatus, ScanSummary};
