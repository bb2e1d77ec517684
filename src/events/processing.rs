//! Dispatch workers for the event processing engine
//!
//! A fixed pool of long-lived workers pulls wrapped events from the bounded
//! processing queue and invokes every handler registered for the event's
//! type. Failed attempts go through the retry/dead-letter policy.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use super::engine_config::EventEngineConfig;
use super::engine_types::EngineStatistics;
use super::error_handling::{DeadLetterEvent, RetryableEvent};
use super::event_types::DomainEvent;
use super::handlers::{EventHandler, EventHandlerResult};
use super::registry::HandlerRegistry;
use super::statistics;

/// Shared state a dispatch worker needs to process and reschedule events
#[derive(Clone)]
pub(crate) struct DispatchContext {
    pub(crate) config: EventEngineConfig,
    pub(crate) registry: HandlerRegistry,
    pub(crate) statistics: Arc<RwLock<EngineStatistics>>,
    pub(crate) processing_tx: mpsc::Sender<RetryableEvent>,
    pub(crate) dead_letter_tx: mpsc::Sender<DeadLetterEvent>,
}

/// Spawn the dispatch worker pool.
///
/// Workers share the single bounded receiver; whichever worker holds the
/// lock blocks on the queue, the rest wait their turn.
pub(crate) fn start_workers(
    ctx: DispatchContext,
    queue: Arc<Mutex<mpsc::Receiver<RetryableEvent>>>,
    shutdown: &broadcast::Sender<()>,
) -> Vec<JoinHandle<()>> {
    (0..ctx.config.worker_count)
        .map(|worker_id| {
            let queue = Arc::clone(&queue);
            let ctx = ctx.clone();
            let shutdown = shutdown.subscribe();
            tokio::spawn(worker_loop(worker_id, queue, ctx, shutdown))
        })
        .collect()
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<Mutex<mpsc::Receiver<RetryableEvent>>>,
    ctx: DispatchContext,
    mut shutdown: broadcast::Receiver<()>,
) {
    log::debug!("⚙️ dispatch worker {} started", worker_id);

    loop {
        let wrapped = {
            let mut queue = queue.lock().await;
            tokio::select! {
                _ = shutdown.recv() => break,
                event = queue.recv() => match event {
                    Some(wrapped) => wrapped,
                    None => break,
                },
            }
        };
        dispatch_event(wrapped, &ctx).await;
    }

    log::debug!("⚙️ dispatch worker {} stopped", worker_id);
}

/// Process one dispatch attempt for a wrapped event
async fn dispatch_event(mut wrapped: RetryableEvent, ctx: &DispatchContext) {
    wrapped.record_attempt();
    let started = Instant::now();
    let event_type = wrapped.event.event_type.clone();

    let handlers = ctx.registry.handlers_for(&event_type).await;
    if handlers.is_empty() {
        // Nothing subscribed: terminal success, never retried.
        log::debug!(
            "✅ event {} ({}) processed with no handlers",
            wrapped.event.event_id,
            event_type,
        );
        statistics::record_processed(&ctx.statistics, started.elapsed()).await;
        return;
    }

    let attempt = timeout(
        ctx.config.processing_timeout(),
        run_handlers(&wrapped.event, &handlers),
    )
    .await;

    let results = match attempt {
        Ok(results) => results,
        Err(_) => {
            let reason = format!(
                "processing attempt timed out after {}ms",
                ctx.config.processing_timeout_ms
            );
            log::error!(
                "⏰ event {} ({}) attempt {}: {}",
                wrapped.event.event_id,
                event_type,
                wrapped.attempts,
                reason,
            );
            wrapped.record_error(reason);
            handle_failed_attempt(wrapped, ctx).await;
            return;
        }
    };

    statistics::record_handler_outcomes(&ctx.statistics, &event_type, &results).await;

    let failed: Vec<&EventHandlerResult> = results.iter().filter(|r| !r.success).collect();
    if failed.len() < results.len() {
        // At least one handler took effect: terminal success. Partial
        // failures are logged, never retried.
        if !failed.is_empty() {
            let names: Vec<&str> = failed.iter().map(|r| r.handler_name.as_str()).collect();
            log::warn!(
                "⚠️ event {} ({}) processed with {} failed handler(s): {}",
                wrapped.event.event_id,
                event_type,
                failed.len(),
                names.join(", "),
            );
        }
        statistics::record_processed(&ctx.statistics, started.elapsed()).await;
        return;
    }

    let errors: Vec<String> = failed
        .iter()
        .map(|r| {
            format!(
                "{}: {}",
                r.handler_name,
                r.error.as_deref().unwrap_or("unknown error")
            )
        })
        .collect();
    wrapped.record_error(errors.join("; "));
    handle_failed_attempt(wrapped, ctx).await;
}

/// Invoke every handler for the event, in registration order
async fn run_handlers(
    event: &DomainEvent,
    handlers: &[Arc<dyn EventHandler>],
) -> Vec<EventHandlerResult> {
    let mut results = Vec::with_capacity(handlers.len());
    for handler in handlers {
        results.push(guarded_handler_call(handler, event).await);
    }
    results
}

/// Invoke a handler, converting a panic into an ordinary failure result so a
/// misbehaving handler cannot take down the worker
async fn guarded_handler_call(
    handler: &Arc<dyn EventHandler>,
    event: &DomainEvent,
) -> EventHandlerResult {
    let name = handler.handler_name();
    let started = Instant::now();

    match AssertUnwindSafe(handler.handle_event(event)).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            log::error!(
                "💥 handler '{}' panicked on event {}: {}",
                name,
                event.event_id,
                reason,
            );
            EventHandlerResult::failure(name, started.elapsed(), format!("handler panicked: {}", reason))
        }
    }
}

/// Apply the retry/dead-letter policy after an attempt where every handler failed
async fn handle_failed_attempt(wrapped: RetryableEvent, ctx: &DispatchContext) {
    if wrapped.can_retry() {
        {
            let mut stats = ctx.statistics.write().await;
            stats.events_retried += 1;
        }
        schedule_retry(wrapped, ctx.clone());
        return;
    }

    // Retry budget exhausted: terminal failure, counted exactly once.
    {
        let mut stats = ctx.statistics.write().await;
        stats.events_failed += 1;
    }

    if !ctx.config.dead_letter_enabled {
        log::warn!(
            "🗑️ event {} ({}) exhausted {} attempts, dead lettering disabled, dropping",
            wrapped.event.event_id,
            wrapped.event.event_type,
            wrapped.attempts,
        );
        let mut stats = ctx.statistics.write().await;
        stats.events_dropped += 1;
        return;
    }

    let event_id = wrapped.event.event_id.clone();
    match ctx
        .dead_letter_tx
        .try_send(DeadLetterEvent::new(wrapped, "retry limit exhausted"))
    {
        Ok(()) => {}
        Err(e) => {
            log::error!(
                "🗑️ dead letter queue unavailable for event {}, dropping: {}",
                event_id,
                e,
            );
            let mut stats = ctx.statistics.write().await;
            stats.events_dropped += 1;
        }
    }
}

/// Schedule a delayed re-enqueue with linear backoff on a detached task
fn schedule_retry(wrapped: RetryableEvent, ctx: DispatchContext) {
    let delay = ctx.config.retry_delay() * wrapped.attempts;
    log::debug!(
        "🔁 retry {}/{} for event {} in {:?}",
        wrapped.attempts,
        wrapped.max_retries,
        wrapped.event.event_id,
        delay,
    );

    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        requeue(wrapped, &ctx).await;
    });
}

/// Re-enqueue a retried event: processing queue first, dead letter queue as
/// the overflow landing spot, dropped when both are full
async fn requeue(wrapped: RetryableEvent, ctx: &DispatchContext) {
    let wrapped = match ctx.processing_tx.try_send(wrapped) {
        Ok(()) => return,
        Err(mpsc::error::TrySendError::Full(wrapped)) => wrapped,
        Err(mpsc::error::TrySendError::Closed(wrapped)) => {
            log::debug!(
                "engine stopped before retry of event {} could be enqueued",
                wrapped.event.event_id,
            );
            return;
        }
    };

    if ctx.config.dead_letter_enabled {
        match ctx
            .dead_letter_tx
            .try_send(DeadLetterEvent::new(wrapped, "processing queue full on retry"))
        {
            Ok(()) => {
                log::warn!("↪ processing queue full, retry diverted to dead letter queue");
                return;
            }
            Err(e) => log::error!("🗑️ both queues full, dropping retried event: {}", e),
        }
    } else {
        log::error!("🗑️ processing queue full and dead lettering disabled, dropping retried event");
    }

    let mut stats = ctx.statistics.write().await;
    stats.events_dropped += 1;
}
