//! Market-wide Volatility Contraction Pattern scanner.
//!
//! Symbols flow through a provider chain (real sources first, synthetic data
//! last), a twelve-filter classifier, and a batched orchestrator that persists
//! matches and run statistics.

pub mod common;
pub mod config;
pub mod core;
pub mod db;
pub mod indicators;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod signals;
