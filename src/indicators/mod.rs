//! Indicator library over daily bars: SMA, EMA, ATR.

pub mod trend;
pub mod volatility;

pub use trend::*;
pub use volatility::*;
