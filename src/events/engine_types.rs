//! Statistics and result types for the event processing engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Statistics about engine operations.
///
/// All counters are monotonically increasing and mutated under the engine's
/// statistics lock, which is independent of the handler registry lock.
/// `uptime_seconds`, the rates and the queue depths are filled in when a
/// snapshot is taken.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatistics {
    /// Events admitted through publish / publish_batch
    pub events_published: u64,
    /// Events that reached terminal success
    pub events_processed: u64,
    /// Events that exhausted their retry budget
    pub events_failed: u64,
    /// Retry attempts scheduled
    pub events_retried: u64,
    /// Events flushed through the dead letter drain
    pub events_dead_lettered: u64,
    /// Events dropped because every landing spot was full
    pub events_dropped: u64,
    /// Published events by event type
    pub events_by_type: HashMap<String, u64>,
    /// Handler outcomes keyed by "<event type>:<success|failure>"
    pub handler_outcomes: HashMap<String, u64>,
    /// Number of currently registered handlers
    pub active_handlers: usize,
    /// Exponential moving average of processing time
    pub avg_processing_time_ms: f64,
    /// Timestamp of the most recently published event
    pub last_event_time: Option<DateTime<Utc>>,
    /// Engine uptime in seconds (snapshot only)
    pub uptime_seconds: u64,
    /// Published events per second of uptime (snapshot only)
    pub publish_rate: f64,
    /// Processed events per second of uptime (snapshot only)
    pub process_rate: f64,
    /// Current processing queue depth (snapshot only)
    pub processing_queue_depth: usize,
    /// Current dead letter queue depth (snapshot only)
    pub dead_letter_queue_depth: usize,
}

impl EngineStatistics {
    /// Create new empty statistics
    pub fn new() -> Self {
        Self {
            events_published: 0,
            events_processed: 0,
            events_failed: 0,
            events_retried: 0,
            events_dead_lettered: 0,
            events_dropped: 0,
            events_by_type: HashMap::new(),
            handler_outcomes: HashMap::new(),
            active_handlers: 0,
            avg_processing_time_ms: 0.0,
            last_event_time: None,
            uptime_seconds: 0,
            publish_rate: 0.0,
            process_rate: 0.0,
            processing_queue_depth: 0,
            dead_letter_queue_depth: 0,
        }
    }

    /// Clear all counters while preserving the handler count
    pub fn clear(&mut self) {
        let active_handlers = self.active_handlers;
        *self = Self::new();
        self.active_handlers = active_handlers;
    }
}

impl Default for EngineStatistics {
    fn default() -> Self {
        Self::new()
    }
}

/// Aggregate outcome of a batch publish call.
///
/// `failed_event_ids` carries the ids of the events that were skipped as
/// invalid or rejected on a full queue, for callers that need to reconcile
/// individual events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublishReport {
    /// Events accepted onto a queue
    pub published: usize,
    /// Events skipped or rejected
    pub failed: usize,
    /// Ids of the skipped/rejected events
    pub failed_event_ids: Vec<String>,
}
