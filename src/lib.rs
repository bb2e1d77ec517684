//! TalentHub backend core.
//!
//! The services of the wider platform (auth, posts, jobs, uploads) publish
//! application events into the engine exposed here and subscribe handlers to
//! them. This crate owns that engine: queuing, concurrent dispatch, retry
//! with backoff, dead lettering and live statistics. Delivery is in-process
//! and best-effort; there is no cross-process broker or persistent log.

pub mod events;

pub use events::{
    DeadLetterEvent, DomainEvent, EngineResult, EngineStatistics, EventEngine, EventEngineConfig,
    EventEngineError, EventHandler, EventHandlerResult, HandlerRegistry, PublishReport,
    RetryableEvent,
};
