//! TalentHub Event Processing Engine
//!
//! In-process engine for application-level events (registrations, posts, job
//! listings, uploads). Accepts single and batch publishes, queues events with
//! fail-fast backpressure, dispatches them concurrently to registered
//! handlers, retries failed deliveries with linear backoff, and routes
//! exhausted events through a dead letter drain while tracking live
//! statistics.

pub mod engine;
pub mod engine_config;
pub mod engine_types;
pub mod error_handling;
pub mod event_types;
pub mod handlers;
pub mod registry;

mod dead_letter;
mod processing;
mod statistics;

#[cfg(test)]
mod engine_tests;

pub use engine::*;
pub use engine_config::*;
pub use engine_types::*;
pub use error_handling::*;
pub use event_types::*;
pub use handlers::*;
pub use registry::*;
