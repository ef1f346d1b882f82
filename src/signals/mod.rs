//! Pattern classification over price series.

pub mod engine;
pub mod vcp;

pub use engine::*;
pub use vcp::*;
