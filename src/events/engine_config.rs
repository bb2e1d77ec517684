//! Configuration for the event processing engine

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::error_handling::{EngineResult, EventEngineError};

/// Tuning parameters for the event processing engine.
///
/// The config is an immutable value object: it is consumed at construction
/// and never changed afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventEngineConfig {
    /// Number of dispatch workers pulling from the processing queue.
    /// Zero is accepted; the engine then admits events without draining them,
    /// which is useful for admission-only setups and tests.
    pub worker_count: usize,
    /// Capacity of the processing queue
    pub queue_capacity: usize,
    /// Capacity of the dead letter queue
    pub dead_letter_capacity: usize,
    /// Maximum retries before an event is dead lettered
    pub max_retries: u32,
    /// Base retry delay in milliseconds; attempt N waits N times this
    pub retry_delay_ms: u64,
    /// Per-attempt processing timeout in milliseconds
    pub processing_timeout_ms: u64,
    /// Enable the dead letter path
    pub dead_letter_enabled: bool,
    /// Dead letter batch size that triggers a flush
    pub dead_letter_batch_size: usize,
    /// Dead letter flush interval in milliseconds
    pub flush_interval_ms: u64,
}

impl Default for EventEngineConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            queue_capacity: 10_000,
            dead_letter_capacity: 1_000,
            max_retries: 3,
            retry_delay_ms: 500,
            processing_timeout_ms: 5_000,
            dead_letter_enabled: true,
            dead_letter_batch_size: 50,
            flush_interval_ms: 5_000,
        }
    }
}

impl EventEngineConfig {
    /// Base retry delay as a `Duration`
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Per-attempt processing timeout as a `Duration`
    pub fn processing_timeout(&self) -> Duration {
        Duration::from_millis(self.processing_timeout_ms)
    }

    /// Dead letter flush interval as a `Duration`
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Load the engine configuration from a TOML file.
    ///
    /// Missing keys fall back to their defaults.
    pub fn from_toml_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|e| EventEngineError::Config {
                reason: format!("failed to read {}: {}", path.as_ref().display(), e),
            })?;
        toml::from_str(&content).map_err(|e| EventEngineError::Config {
            reason: format!("failed to parse {}: {}", path.as_ref().display(), e),
        })
    }
}
