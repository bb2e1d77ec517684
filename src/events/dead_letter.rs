//! Dead letter drain for the event processing engine
//!
//! A dedicated loop pulls exhausted and overflowed events off the dead letter
//! queue, accumulates them into batches, and flushes a batch when it reaches
//! the configured size or the flush interval elapses, whichever comes first.
//! Flushed entries are logged and kept in an in-memory store for inspection;
//! a persistent alerting sink would plug in at the flush point.

use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;

use super::engine_config::EventEngineConfig;
use super::engine_types::EngineStatistics;
use super::error_handling::DeadLetterEvent;

/// Start the dead letter drain loop
pub(crate) fn start_drain(
    config: EventEngineConfig,
    mut receiver: mpsc::Receiver<DeadLetterEvent>,
    store: Arc<RwLock<Vec<DeadLetterEvent>>>,
    statistics: Arc<RwLock<EngineStatistics>>,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        log::debug!("🗄️ dead letter drain started");

        let batch_size = config.dead_letter_batch_size.max(1);
        let mut batch: Vec<DeadLetterEvent> = Vec::with_capacity(batch_size);
        let mut interval = tokio::time::interval(config.flush_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately and would flush nothing.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = interval.tick() => {
                    flush_batch(&mut batch, &store, &statistics).await;
                }
                entry = receiver.recv() => match entry {
                    Some(entry) => {
                        batch.push(entry);
                        if batch.len() >= batch_size {
                            flush_batch(&mut batch, &store, &statistics).await;
                        }
                    }
                    None => break,
                },
            }
        }

        // Flush whatever is left so shutdown loses nothing already drained.
        flush_batch(&mut batch, &store, &statistics).await;
        log::debug!("🗄️ dead letter drain stopped");
    })
}

/// Flush a batch: log every entry and retain it in the inspection store
async fn flush_batch(
    batch: &mut Vec<DeadLetterEvent>,
    store: &Arc<RwLock<Vec<DeadLetterEvent>>>,
    statistics: &Arc<RwLock<EngineStatistics>>,
) {
    if batch.is_empty() {
        return;
    }

    log::warn!("🗄️ flushing {} dead letter event(s)", batch.len());
    for entry in batch.iter() {
        log::warn!(
            "🗄️ dead letter: event {} ({}) after {} attempt(s), reason: {}, last error: {}",
            entry.event.event.event_id,
            entry.event.event.event_type,
            entry.event.attempts,
            entry.reason,
            entry.event.last_error.as_deref().unwrap_or("-"),
        );
    }

    {
        let mut stats = statistics.write().await;
        stats.events_dead_lettered += batch.len() as u64;
    }

    let mut store = store.write().await;
    store.append(batch);
}
