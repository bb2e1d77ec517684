//! Handler registry for the event processing engine
//!
//! Maps event types to ordered handler lists. Reads vastly outnumber writes:
//! every dispatch takes a snapshot of a type's handlers under the shared lock,
//! so registration changes never block or race with in-flight dispatch.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::error_handling::{EngineResult, EventEngineError};
use super::handlers::EventHandler;

/// Type-indexed collection of event handlers, mutable at runtime
#[derive(Clone)]
pub struct HandlerRegistry {
    handlers: Arc<RwLock<HashMap<String, Vec<Arc<dyn EventHandler>>>>>,
}

impl HandlerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a handler for an event type.
    ///
    /// Handlers are appended: invocation order during dispatch is
    /// registration order.
    pub async fn register(
        &self,
        event_type: &str,
        handler: Arc<dyn EventHandler>,
    ) -> EngineResult<()> {
        if event_type.trim().is_empty() {
            return Err(EventEngineError::InvalidRegistration {
                reason: "event type is empty".to_string(),
            });
        }

        let mut handlers = self.handlers.write().await;
        handlers
            .entry(event_type.to_string())
            .or_default()
            .push(handler);
        Ok(())
    }

    /// Unregister the handler with the given name from an event type.
    ///
    /// The event type entry is removed entirely when its handler list becomes
    /// empty, so the registry never holds an empty list.
    pub async fn unregister(&self, event_type: &str, handler_name: &str) -> EngineResult<()> {
        let mut handlers = self.handlers.write().await;

        let list = handlers
            .get_mut(event_type)
            .ok_or_else(|| EventEngineError::HandlerNotFound {
                event_type: event_type.to_string(),
                handler_name: handler_name.to_string(),
            })?;

        let position = list
            .iter()
            .position(|h| h.handler_name() == handler_name)
            .ok_or_else(|| EventEngineError::HandlerNotFound {
                event_type: event_type.to_string(),
                handler_name: handler_name.to_string(),
            })?;

        list.remove(position);
        if list.is_empty() {
            handlers.remove(event_type);
        }
        Ok(())
    }

    /// Snapshot the handlers registered for an event type, in invocation order
    pub async fn handlers_for(&self, event_type: &str) -> Vec<Arc<dyn EventHandler>> {
        let handlers = self.handlers.read().await;
        handlers.get(event_type).cloned().unwrap_or_default()
    }

    /// Total number of registered handlers across all event types
    pub async fn handler_count(&self) -> usize {
        let handlers = self.handlers.read().await;
        handlers.values().map(|list| list.len()).sum()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
