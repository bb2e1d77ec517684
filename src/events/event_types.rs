//! Event type definitions for the TalentHub event processing engine
//!
//! This module defines the domain event structure published through the engine,
//! together with the well-known application event types (registrations, posts,
//! job listings, file uploads) and their constructors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::error_handling::{EngineResult, EventEngineError};

/// A new user account was registered.
pub const EVENT_USER_REGISTERED: &str = "user.registered";
/// A community post was created.
pub const EVENT_POST_CREATED: &str = "post.created";
/// A job listing was published.
pub const EVENT_JOB_POSTED: &str = "job.posted";
/// A file finished uploading.
pub const EVENT_FILE_UPLOADED: &str = "file.uploaded";

/// An application-level event published through the engine.
///
/// Events are immutable facts: once published they are never mutated. The
/// engine only inspects `event_id`, `event_type` and `occurred_at`; everything
/// else is carried opaquely to the handlers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Unique event identifier, supplied by the producer
    pub event_id: String,
    /// Stable event type name (e.g. "post.created")
    pub event_type: String,
    /// When the event occurred, in UTC
    pub occurred_at: DateTime<Utc>,
    /// Actor that caused the event (user, service, etc.)
    pub actor: Option<String>,
    /// Event-specific metadata
    pub metadata: HashMap<String, serde_json::Value>,
}

impl DomainEvent {
    /// Create an event of the given type with a fresh id and current timestamp.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            occurred_at: Utc::now(),
            actor: None,
            metadata: HashMap::new(),
        }
    }

    /// Event emitted when a user account is registered.
    pub fn user_registered(user_id: &str) -> Self {
        Self::new(EVENT_USER_REGISTERED)
            .with_actor(user_id)
            .with_metadata("user_id", serde_json::Value::String(user_id.to_string()))
    }

    /// Event emitted when a community post is created.
    pub fn post_created(post_id: &str, author_id: &str) -> Self {
        Self::new(EVENT_POST_CREATED)
            .with_actor(author_id)
            .with_metadata("post_id", serde_json::Value::String(post_id.to_string()))
    }

    /// Event emitted when a job listing is published.
    pub fn job_posted(job_id: &str, company_id: &str) -> Self {
        Self::new(EVENT_JOB_POSTED)
            .with_actor(company_id)
            .with_metadata("job_id", serde_json::Value::String(job_id.to_string()))
    }

    /// Event emitted when a file upload completes.
    pub fn file_uploaded(file_id: &str, uploader_id: &str, size_bytes: u64) -> Self {
        Self::new(EVENT_FILE_UPLOADED)
            .with_actor(uploader_id)
            .with_metadata("file_id", serde_json::Value::String(file_id.to_string()))
            .with_metadata("size_bytes", serde_json::Value::from(size_bytes))
    }

    /// Override the generated event id with a producer-supplied one.
    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = event_id.into();
        self
    }

    /// Set the actor that caused this event.
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Attach a metadata entry to this event.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Validate the structural invariants required for publishing.
    ///
    /// Rejects an empty id, an empty type and an unset (epoch) timestamp.
    pub fn validate(&self) -> EngineResult<()> {
        if self.event_id.trim().is_empty() {
            return Err(EventEngineError::InvalidEvent {
                reason: "event id is empty".to_string(),
            });
        }
        if self.event_type.trim().is_empty() {
            return Err(EventEngineError::InvalidEvent {
                reason: "event type is empty".to_string(),
            });
        }
        if self.occurred_at.timestamp_millis() == 0 {
            return Err(EventEngineError::InvalidEvent {
                reason: "event timestamp is unset".to_string(),
            });
        }
        Ok(())
    }
}
