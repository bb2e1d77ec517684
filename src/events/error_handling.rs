//! Error types and retry bookkeeping for the event processing engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::event_types::DomainEvent;

/// Errors that can occur within the event processing engine
#[derive(Error, Debug)]
pub enum EventEngineError {
    /// Event failed structural validation at publish time
    #[error("Invalid event: {reason}")]
    InvalidEvent { reason: String },

    /// Handler registration call was malformed
    #[error("Invalid handler registration: {reason}")]
    InvalidRegistration { reason: String },

    /// Unregistering a handler or event type that is not present
    #[error("No handler '{handler_name}' registered for event type '{event_type}'")]
    HandlerNotFound {
        event_type: String,
        handler_name: String,
    },

    /// Both the processing queue and the dead letter queue were full
    #[error("Event queues are full, event {event_id} rejected")]
    QueuesFull { event_id: String },

    /// Publish attempted after the engine shut down
    #[error("Event engine is stopped")]
    EngineStopped,

    /// Shutdown wait elapsed before all loops drained
    #[error("Shutdown timed out while waiting for engine loops to drain")]
    ShutdownTimeout,

    /// Configuration could not be loaded
    #[error("Configuration error: {reason}")]
    Config { reason: String },
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EventEngineError>;

/// Event with retry metadata, alive only while the event is in flight
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryableEvent {
    /// The original event
    pub event: DomainEvent,
    /// Number of dispatch attempts made so far
    pub attempts: u32,
    /// Maximum retries allowed before the event is exhausted
    pub max_retries: u32,
    /// When the first dispatch attempt started
    pub first_attempt_at: Option<DateTime<Utc>>,
    /// When the most recent dispatch attempt started
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Error from the most recent failed attempt
    pub last_error: Option<String>,
}

impl RetryableEvent {
    /// Wrap an event for dispatch
    pub fn new(event: DomainEvent, max_retries: u32) -> Self {
        Self {
            event,
            attempts: 0,
            max_retries,
            first_attempt_at: None,
            last_attempt_at: None,
            last_error: None,
        }
    }

    /// Record the start of a dispatch attempt.
    ///
    /// Attempts never exceed `max_retries + 1`: the wrapper is exhausted once
    /// `attempts` passes `max_retries`.
    pub fn record_attempt(&mut self) {
        let now = Utc::now();
        self.attempts += 1;
        if self.first_attempt_at.is_none() {
            self.first_attempt_at = Some(now);
        }
        self.last_attempt_at = Some(now);
    }

    /// Record the error from a failed attempt
    pub fn record_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
    }

    /// Check if another dispatch attempt may be scheduled
    pub fn can_retry(&self) -> bool {
        self.attempts <= self.max_retries
    }

    /// Check if the event has exhausted its retry budget
    pub fn is_exhausted(&self) -> bool {
        !self.can_retry()
    }
}

/// Event that could not be processed, held in the dead letter path
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeadLetterEvent {
    /// The wrapped event with its retry bookkeeping
    pub event: RetryableEvent,
    /// When the event was moved to the dead letter queue
    pub dead_lettered_at: DateTime<Utc>,
    /// Reason for dead lettering
    pub reason: String,
}

impl DeadLetterEvent {
    /// Create a new dead letter entry
    pub fn new(event: RetryableEvent, reason: impl Into<String>) -> Self {
        Self {
            event,
            dead_lettered_at: Utc::now(),
            reason: reason.into(),
        }
    }
}
