//! Core event processing engine
//!
//! The engine accepts application events, queues them with fail-fast
//! backpressure, dispatches them concurrently to registered handlers,
//! retries failed deliveries with linear backoff, and routes exhausted
//! events to a dead letter drain, tracking live statistics throughout.
//!
//! Delivery is best-effort and in-memory: a successful publish acknowledges
//! admission, not processing, and a process restart loses anything still
//! queued. Consumers that need stronger guarantees must be idempotent and
//! tolerate redelivery.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;

use super::dead_letter;
use super::engine_config::EventEngineConfig;
use super::engine_types::{EngineStatistics, PublishReport};
use super::error_handling::{DeadLetterEvent, EngineResult, EventEngineError, RetryableEvent};
use super::event_types::DomainEvent;
use super::handlers::EventHandler;
use super::processing::{self, DispatchContext};
use super::registry::HandlerRegistry;
use super::statistics;

/// In-process event processing engine.
///
/// Construction starts the dispatch workers, the dead letter drain and the
/// statistics reporter; they run until `shutdown` is called or the engine is
/// dropped. The engine is an explicitly constructed instance meant to be
/// shared (e.g. behind an `Arc`) with the services that publish into it.
pub struct EventEngine {
    config: EventEngineConfig,
    registry: HandlerRegistry,
    statistics: Arc<RwLock<EngineStatistics>>,
    processing_tx: mpsc::Sender<RetryableEvent>,
    // Keeps the processing queue open until shutdown, even with zero workers.
    processing_queue: Option<Arc<tokio::sync::Mutex<mpsc::Receiver<RetryableEvent>>>>,
    dead_letter_tx: mpsc::Sender<DeadLetterEvent>,
    dead_letters: Arc<RwLock<Vec<DeadLetterEvent>>>,
    shutdown_tx: broadcast::Sender<()>,
    task_handles: Vec<JoinHandle<()>>,
    start_time: DateTime<Utc>,
}

impl EventEngine {
    /// Create an engine and start its background loops
    pub fn new(config: EventEngineConfig) -> Self {
        // tokio channels require a non-zero capacity
        let (processing_tx, processing_rx) = mpsc::channel(config.queue_capacity.max(1));
        let (dead_letter_tx, dead_letter_rx) = mpsc::channel(config.dead_letter_capacity.max(1));
        let (shutdown_tx, _) = broadcast::channel(1);

        let registry = HandlerRegistry::new();
        let statistics = Arc::new(RwLock::new(EngineStatistics::new()));
        let dead_letters = Arc::new(RwLock::new(Vec::new()));
        let start_time = Utc::now();

        let ctx = DispatchContext {
            config: config.clone(),
            registry: registry.clone(),
            statistics: Arc::clone(&statistics),
            processing_tx: processing_tx.clone(),
            dead_letter_tx: dead_letter_tx.clone(),
        };

        let processing_queue = Arc::new(tokio::sync::Mutex::new(processing_rx));
        let mut task_handles =
            processing::start_workers(ctx, Arc::clone(&processing_queue), &shutdown_tx);

        if config.dead_letter_enabled {
            task_handles.push(dead_letter::start_drain(
                config.clone(),
                dead_letter_rx,
                Arc::clone(&dead_letters),
                Arc::clone(&statistics),
                shutdown_tx.subscribe(),
            ));
        } else {
            // Without the drain the dead letter channel has no receiver;
            // the publish/retry paths never send on it when disabled.
            drop(dead_letter_rx);
        }

        task_handles.push(statistics::start_reporter(
            Arc::clone(&statistics),
            start_time,
            processing_tx.clone(),
            dead_letter_tx.clone(),
            shutdown_tx.subscribe(),
        ));

        log::info!(
            "🚀 event engine started with {} worker(s), queue capacity {}",
            config.worker_count,
            config.queue_capacity,
        );

        Self {
            config,
            registry,
            statistics,
            processing_tx,
            processing_queue: Some(processing_queue),
            dead_letter_tx,
            dead_letters,
            shutdown_tx,
            task_handles,
            start_time,
        }
    }

    /// Create an engine with default configuration
    pub fn with_default_config() -> Self {
        Self::new(EventEngineConfig::default())
    }

    /// Engine configuration (read-only)
    pub fn config(&self) -> &EventEngineConfig {
        &self.config
    }

    /// Publish a single event.
    ///
    /// Validates the event, wraps it and attempts a non-blocking enqueue:
    /// the processing queue first, the dead letter queue as an overflow
    /// landing spot when enabled. A successful return means the event was
    /// admitted, not that it has been processed.
    pub async fn publish(&self, event: DomainEvent) -> EngineResult<()> {
        event.validate()?;
        self.enqueue(RetryableEvent::new(event, self.config.max_retries))
            .await
    }

    /// Publish a batch of events.
    ///
    /// Every event is validated up front; invalid ones are logged and
    /// skipped. The report carries aggregate counts plus the ids of the
    /// events that were skipped or rejected.
    pub async fn publish_batch(&self, events: Vec<DomainEvent>) -> PublishReport {
        let mut report = PublishReport::default();
        let mut valid = Vec::with_capacity(events.len());

        for event in events {
            match event.validate() {
                Ok(()) => valid.push(event),
                Err(e) => {
                    log::warn!("⚠️ skipping invalid event '{}' in batch: {}", event.event_id, e);
                    report.failed += 1;
                    report.failed_event_ids.push(event.event_id);
                }
            }
        }

        for event in valid {
            let event_id = event.event_id.clone();
            match self
                .enqueue(RetryableEvent::new(event, self.config.max_retries))
                .await
            {
                Ok(()) => report.published += 1,
                Err(e) => {
                    log::warn!("⚠️ failed to enqueue event '{}' in batch: {}", event_id, e);
                    report.failed += 1;
                    report.failed_event_ids.push(event_id);
                }
            }
        }

        report
    }

    async fn enqueue(&self, wrapped: RetryableEvent) -> EngineResult<()> {
        let event_type = wrapped.event.event_type.clone();

        let wrapped = match self.processing_tx.try_send(wrapped) {
            Ok(()) => {
                statistics::record_published(&self.statistics, &event_type).await;
                return Ok(());
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                return Err(EventEngineError::EngineStopped);
            }
            Err(mpsc::error::TrySendError::Full(wrapped)) => wrapped,
        };

        if !self.config.dead_letter_enabled {
            return Err(EventEngineError::QueuesFull {
                event_id: wrapped.event.event_id,
            });
        }

        let entry = DeadLetterEvent::new(wrapped, "processing queue full at publish");
        match self.dead_letter_tx.try_send(entry) {
            Ok(()) => {
                log::warn!(
                    "↪ processing queue full, event diverted to dead letter queue"
                );
                statistics::record_published(&self.statistics, &event_type).await;
                Ok(())
            }
            Err(e) => {
                let entry = match e {
                    mpsc::error::TrySendError::Full(entry)
                    | mpsc::error::TrySendError::Closed(entry) => entry,
                };
                Err(EventEngineError::QueuesFull {
                    event_id: entry.event.event.event_id,
                })
            }
        }
    }

    /// Register a handler for an event type.
    ///
    /// Handlers for a type are invoked in registration order.
    pub async fn register_handler(
        &self,
        event_type: &str,
        handler: Arc<dyn EventHandler>,
    ) -> EngineResult<()> {
        let name = handler.handler_name();
        self.registry.register(event_type, handler).await?;

        let count = self.registry.handler_count().await;
        {
            let mut stats = self.statistics.write().await;
            stats.active_handlers = count;
        }

        log::info!("📝 registered handler '{}' for '{}'", name, event_type);
        Ok(())
    }

    /// Unregister a handler from an event type by its name
    pub async fn unregister_handler(
        &self,
        event_type: &str,
        handler_name: &str,
    ) -> EngineResult<()> {
        self.registry.unregister(event_type, handler_name).await?;

        let count = self.registry.handler_count().await;
        {
            let mut stats = self.statistics.write().await;
            stats.active_handlers = count;
        }

        log::info!("📝 unregistered handler '{}' from '{}'", handler_name, event_type);
        Ok(())
    }

    /// Snapshot of the current engine statistics
    pub async fn get_statistics(&self) -> EngineStatistics {
        statistics::snapshot(
            &self.statistics,
            self.start_time,
            &self.processing_tx,
            &self.dead_letter_tx,
        )
        .await
    }

    /// Clear all statistics counters (useful for testing)
    pub async fn clear_statistics(&self) {
        let mut stats = self.statistics.write().await;
        stats.clear();
    }

    /// Dead letter events flushed by the drain, oldest first
    pub async fn dead_letters(&self) -> Vec<DeadLetterEvent> {
        self.dead_letters.read().await.clone()
    }

    /// Clear the retained dead letter events, returning how many there were
    pub async fn clear_dead_letters(&self) -> usize {
        let mut store = self.dead_letters.write().await;
        let count = store.len();
        store.clear();
        count
    }

    /// Stop the engine, waiting up to `timeout` for the loops to drain.
    ///
    /// Shutdown is best-effort: when the timeout elapses first this returns
    /// `ShutdownTimeout` while workers may still be finishing their current
    /// dispatch.
    pub async fn shutdown(&mut self, timeout: Duration) -> EngineResult<()> {
        log::info!("🛑 stopping event engine");
        let _ = self.shutdown_tx.send(());

        let handles = std::mem::take(&mut self.task_handles);
        let drained = tokio::time::timeout(timeout, futures::future::join_all(handles)).await;

        // Release the queue so later publishes see the engine as stopped.
        self.processing_queue.take();

        match drained {
            Ok(_) => {
                log::info!("✅ event engine stopped");
                Ok(())
            }
            Err(_) => {
                log::warn!("⏰ event engine shutdown timed out");
                Err(EventEngineError::ShutdownTimeout)
            }
        }
    }
}

impl Drop for EventEngine {
    fn drop(&mut self) {
        // Best-effort stop if shutdown was never called.
        let _ = self.shutdown_tx.send(());
        for handle in &self.task_handles {
            handle.abort();
        }
    }
}
