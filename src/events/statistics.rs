//! Statistics management for the event processing engine
//!
//! Counter updates shared by the ingestion and dispatch paths, snapshot
//! assembly, and the periodic reporter loop.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;

use super::engine_types::EngineStatistics;
use super::error_handling::{DeadLetterEvent, RetryableEvent};
use super::handlers::EventHandlerResult;

/// How often the reporter loop logs a statistics snapshot
pub(crate) const REPORT_INTERVAL: Duration = Duration::from_secs(60);

/// Record an admitted event
pub(crate) async fn record_published(
    statistics: &Arc<RwLock<EngineStatistics>>,
    event_type: &str,
) {
    let mut stats = statistics.write().await;
    stats.events_published += 1;
    stats.last_event_time = Some(Utc::now());
    *stats.events_by_type.entry(event_type.to_string()).or_insert(0) += 1;
}

/// Record a terminal success and fold its duration into the moving average
pub(crate) async fn record_processed(
    statistics: &Arc<RwLock<EngineStatistics>>,
    duration: Duration,
) {
    let mut stats = statistics.write().await;
    stats.events_processed += 1;

    let duration_ms = duration.as_secs_f64() * 1_000.0;
    // Exponential moving average
    stats.avg_processing_time_ms = if stats.avg_processing_time_ms == 0.0 {
        duration_ms
    } else {
        0.9 * stats.avg_processing_time_ms + 0.1 * duration_ms
    };
}

/// Record per-handler outcomes keyed by event type
pub(crate) async fn record_handler_outcomes(
    statistics: &Arc<RwLock<EngineStatistics>>,
    event_type: &str,
    results: &[EventHandlerResult],
) {
    if results.is_empty() {
        return;
    }
    let mut stats = statistics.write().await;
    for result in results {
        let outcome = if result.success { "success" } else { "failure" };
        let key = format!("{}:{}", event_type, outcome);
        *stats.handler_outcomes.entry(key).or_insert(0) += 1;
    }
}

/// Assemble a snapshot with uptime, rates and current queue depths.
///
/// Readers get a defensive copy; the live maps are never exposed.
pub(crate) async fn snapshot(
    statistics: &Arc<RwLock<EngineStatistics>>,
    start_time: DateTime<Utc>,
    processing_tx: &mpsc::Sender<RetryableEvent>,
    dead_letter_tx: &mpsc::Sender<DeadLetterEvent>,
) -> EngineStatistics {
    let mut stats = statistics.read().await.clone();
    stats.uptime_seconds = (Utc::now() - start_time).num_seconds().max(0) as u64;

    let uptime = stats.uptime_seconds.max(1) as f64;
    stats.publish_rate = stats.events_published as f64 / uptime;
    stats.process_rate = stats.events_processed as f64 / uptime;

    stats.processing_queue_depth = processing_tx.max_capacity() - processing_tx.capacity();
    stats.dead_letter_queue_depth = dead_letter_tx.max_capacity() - dead_letter_tx.capacity();
    stats
}

/// Start the periodic reporter loop that logs a statistics snapshot
pub(crate) fn start_reporter(
    statistics: Arc<RwLock<EngineStatistics>>,
    start_time: DateTime<Utc>,
    processing_tx: mpsc::Sender<RetryableEvent>,
    dead_letter_tx: mpsc::Sender<DeadLetterEvent>,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(REPORT_INTERVAL);
        // The first tick fires immediately.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = interval.tick() => {
                    let stats =
                        snapshot(&statistics, start_time, &processing_tx, &dead_letter_tx).await;
                    log::info!(
                        "📊 engine stats: published={} processed={} failed={} retried={} \
                         dead_lettered={} dropped={} queue={} dlq={} publish_rate={:.2}/s \
                         process_rate={:.2}/s avg_processing={:.2}ms",
                        stats.events_published,
                        stats.events_processed,
                        stats.events_failed,
                        stats.events_retried,
                        stats.events_dead_lettered,
                        stats.events_dropped,
                        stats.processing_queue_depth,
                        stats.dead_letter_queue_depth,
                        stats.publish_rate,
                        stats.process_rate,
                        stats.avg_processing_time_ms,
                    );
                }
            }
        }
        log::debug!("📊 statistics reporter stopped");
    })
}
