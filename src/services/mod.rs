//! Market data acquisition: providers and the fallback chain.

pub mod alpha_vantage;
pub mod chain;
pub mod market_data;
pub mod synthetic;
pub mod yahoo;

pub use alpha_vantage::{AlphaVantageConfig, AlphaVantageProvider};
pub use chain::{AttemptOutcome, ChainConfig, FetchOutcome, ProviderAttempt, ProviderChain};
pub use market_data::{DataProvider, FetchError};
pub use synthetic::{SyntheticConfig, SyntheticProvider};
pub use yahoo::{YahooConfig, YahooProvider};
