//! Core application primitives (orchestrator, events, HTTP, scheduling)

pub mod events;
pub mod http;
pub mod orchestrator;
pub mod scheduler;

pub use events::*;
pub use http::*;
pub use orchestrator::*;
pub use scheduler::*;
