//! Pluggable event handler architecture
//!
//! This module provides the handler contract implemented by the application
//! modules (auth, posts, jobs, uploads) that subscribe to events, plus
//! built-in handlers for common sinks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use super::event_types::DomainEvent;

/// Result of a single handler invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventHandlerResult {
    /// Name of the handler that processed the event
    pub handler_name: String,
    /// Whether the handler processed the event successfully
    pub success: bool,
    /// Duration taken to process the event
    pub duration: Duration,
    /// Error message if processing failed
    pub error: Option<String>,
    /// Additional metadata from the handler
    pub metadata: HashMap<String, serde_json::Value>,
}

impl EventHandlerResult {
    /// Create a successful handler result
    pub fn success(handler_name: impl Into<String>, duration: Duration) -> Self {
        Self {
            handler_name: handler_name.into(),
            success: true,
            duration,
            error: None,
            metadata: HashMap::new(),
        }
    }

    /// Create a failed handler result
    pub fn failure(
        handler_name: impl Into<String>,
        duration: Duration,
        error: impl Into<String>,
    ) -> Self {
        Self {
            handler_name: handler_name.into(),
            success: false,
            duration,
            error: Some(error.into()),
            metadata: HashMap::new(),
        }
    }

    /// Attach a metadata entry to this result
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Trait for implementing event handlers.
///
/// Handlers are invoked concurrently from multiple dispatch workers and must
/// be safe to call from any of them. A handler reports failure through its
/// result rather than by panicking; panics are contained by the dispatch
/// loop and converted into failure results.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle an event and return the outcome
    async fn handle_event(&self, event: &DomainEvent) -> EventHandlerResult;

    /// Stable name identifying this handler within a type's handler list
    fn handler_name(&self) -> String;
}

/// Built-in audit trail handler.
///
/// Appends one line per event to a file, either as structured JSON or in a
/// human-readable form.
pub struct AuditLogHandler {
    /// Name of this handler
    name: String,
    /// File path for the audit trail
    log_path: String,
    /// Whether to write structured JSON lines
    structured: bool,
}

impl AuditLogHandler {
    /// Create a new audit handler writing JSON lines to `log_path`
    pub fn new(log_path: impl Into<String>) -> Self {
        Self {
            name: "audit_log_handler".to_string(),
            log_path: log_path.into(),
            structured: true,
        }
    }

    /// Set handler name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Toggle structured JSON output
    pub fn with_structured(mut self, structured: bool) -> Self {
        self.structured = structured;
        self
    }

    fn format_entry(&self, event: &DomainEvent) -> Result<String, String> {
        if self.structured {
            serde_json::to_string(event)
                .map(|json| format!("{}\n", json))
                .map_err(|e| format!("JSON serialization failed: {}", e))
        } else {
            Ok(format!(
                "[{}] {} {} actor={}\n",
                event.occurred_at.format("%Y-%m-%d %H:%M:%S UTC"),
                event.event_type,
                event.event_id,
                event.actor.as_deref().unwrap_or("-"),
            ))
        }
    }
}

#[async_trait]
impl EventHandler for AuditLogHandler {
    async fn handle_event(&self, event: &DomainEvent) -> EventHandlerResult {
        let start_time = std::time::Instant::now();

        let entry = match self.format_entry(event) {
            Ok(entry) => entry,
            Err(e) => return EventHandlerResult::failure(self.name.clone(), start_time.elapsed(), e),
        };

        let mut file = match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await
        {
            Ok(file) => file,
            Err(e) => {
                return EventHandlerResult::failure(
                    self.name.clone(),
                    start_time.elapsed(),
                    format!("Failed to open audit log: {}", e),
                );
            }
        };

        match file.write_all(entry.as_bytes()).await {
            Ok(()) => EventHandlerResult::success(self.name.clone(), start_time.elapsed())
                .with_metadata(
                    "log_path",
                    serde_json::Value::String(self.log_path.clone()),
                ),
            Err(e) => EventHandlerResult::failure(
                self.name.clone(),
                start_time.elapsed(),
                format!("Failed to write audit log: {}", e),
            ),
        }
    }

    fn handler_name(&self) -> String {
        self.name.clone()
    }
}

/// Built-in handler that forwards events to the `log` facade
pub struct LogHandler {
    /// Name of this handler
    name: String,
    /// Level to log events at
    level: log::Level,
}

impl LogHandler {
    /// Create a new log handler emitting at info level
    pub fn new() -> Self {
        Self {
            name: "log_handler".to_string(),
            level: log::Level::Info,
        }
    }

    /// Set handler name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the log level events are emitted at
    pub fn with_level(mut self, level: log::Level) -> Self {
        self.level = level;
        self
    }
}

impl Default for LogHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventHandler for LogHandler {
    async fn handle_event(&self, event: &DomainEvent) -> EventHandlerResult {
        let start_time = std::time::Instant::now();
        log::log!(
            self.level,
            "📨 event {} ({}) actor={}",
            event.event_id,
            event.event_type,
            event.actor.as_deref().unwrap_or("-"),
        );
        EventHandlerResult::success(self.name.clone(), start_time.elapsed())
    }

    fn handler_name(&self) -> String {
        self.name.clone()
    }
}
