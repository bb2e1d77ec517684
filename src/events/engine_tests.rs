//! Tests for the event processing engine

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::engine::EventEngine;
use super::engine_config::EventEngineConfig;
use super::engine_types::EngineStatistics;
use super::error_handling::{DeadLetterEvent, EventEngineError};
use super::event_types::DomainEvent;
use super::handlers::{EventHandler, EventHandlerResult};

/// Handler that always succeeds and counts its invocations
struct CountingHandler {
    name: String,
    calls: Arc<AtomicUsize>,
}

impl CountingHandler {
    fn new(name: &str) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                name: name.to_string(),
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

#[async_trait]
impl EventHandler for CountingHandler {
    async fn handle_event(&self, _event: &DomainEvent) -> EventHandlerResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        EventHandlerResult::success(self.name.clone(), Duration::from_micros(10))
    }

    fn handler_name(&self) -> String {
        self.name.clone()
    }
}

/// Handler that always fails
struct FailingHandler {
    name: String,
}

impl FailingHandler {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl EventHandler for FailingHandler {
    async fn handle_event(&self, _event: &DomainEvent) -> EventHandlerResult {
        EventHandlerResult::failure(self.name.clone(), Duration::from_micros(10), "always fails")
    }

    fn handler_name(&self) -> String {
        self.name.clone()
    }
}

/// Handler that panics on every invocation
struct PanickingHandler;

#[async_trait]
impl EventHandler for PanickingHandler {
    async fn handle_event(&self, _event: &DomainEvent) -> EventHandlerResult {
        panic!("handler exploded");
    }

    fn handler_name(&self) -> String {
        "panicking_handler".to_string()
    }
}

/// Handler that sleeps longer than any reasonable processing timeout
struct SlowHandler {
    delay: Duration,
}

#[async_trait]
impl EventHandler for SlowHandler {
    async fn handle_event(&self, _event: &DomainEvent) -> EventHandlerResult {
        tokio::time::sleep(self.delay).await;
        EventHandlerResult::success("slow_handler", self.delay)
    }

    fn handler_name(&self) -> String {
        "slow_handler".to_string()
    }
}

/// Handler that records its name on every invocation, for ordering checks
struct RecorderHandler {
    name: String,
    record: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl EventHandler for RecorderHandler {
    async fn handle_event(&self, _event: &DomainEvent) -> EventHandlerResult {
        self.record.lock().unwrap().push(self.name.clone());
        EventHandlerResult::success(self.name.clone(), Duration::from_micros(10))
    }

    fn handler_name(&self) -> String {
        self.name.clone()
    }
}

/// Config with short delays so retry/dead-letter paths settle quickly
fn fast_config() -> EventEngineConfig {
    EventEngineConfig {
        worker_count: 1,
        queue_capacity: 64,
        dead_letter_capacity: 16,
        max_retries: 2,
        retry_delay_ms: 10,
        processing_timeout_ms: 1_000,
        dead_letter_enabled: true,
        dead_letter_batch_size: 1,
        flush_interval_ms: 20,
    }
}

/// Poll the statistics until `check` passes or two seconds elapse
async fn wait_for_stats<F>(engine: &EventEngine, what: &str, check: F) -> EngineStatistics
where
    F: Fn(&EngineStatistics) -> bool,
{
    for _ in 0..200 {
        let stats = engine.get_statistics().await;
        if check(&stats) {
            return stats;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}

/// Poll the retained dead letters until `count` entries are present
async fn wait_for_dead_letters(engine: &EventEngine, count: usize) -> Vec<DeadLetterEvent> {
    for _ in 0..200 {
        let dead = engine.dead_letters().await;
        if dead.len() >= count {
            return dead;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {} dead letter event(s)", count);
}

#[tokio::test]
async fn test_engine_creation() {
    let engine = EventEngine::with_default_config();
    assert_eq!(engine.config().worker_count, 4);
    assert_eq!(engine.config().queue_capacity, 10_000);
    assert!(engine.config().dead_letter_enabled);

    let stats = engine.get_statistics().await;
    assert_eq!(stats.events_published, 0);
    assert_eq!(stats.active_handlers, 0);
}

#[tokio::test]
async fn test_publish_rejects_invalid_events() {
    let engine = EventEngine::new(fast_config());

    let no_id = DomainEvent::post_created("p-1", "u-1").with_event_id("");
    let err = engine.publish(no_id).await.unwrap_err();
    assert!(matches!(err, EventEngineError::InvalidEvent { .. }));

    let no_type = DomainEvent::new("");
    let err = engine.publish(no_type).await.unwrap_err();
    assert!(matches!(err, EventEngineError::InvalidEvent { .. }));

    let mut no_timestamp = DomainEvent::user_registered("u-1");
    no_timestamp.occurred_at = chrono::DateTime::UNIX_EPOCH;
    let err = engine.publish(no_timestamp).await.unwrap_err();
    assert!(matches!(err, EventEngineError::InvalidEvent { .. }));

    let stats = engine.get_statistics().await;
    assert_eq!(stats.events_published, 0);
}

#[tokio::test]
async fn test_events_without_handlers_are_processed() {
    let engine = EventEngine::new(fast_config());

    for i in 0..5 {
        let event = DomainEvent::post_created(&format!("p-{}", i), "u-1");
        engine.publish(event).await.unwrap();
    }

    let stats = wait_for_stats(&engine, "5 processed events", |s| s.events_processed == 5).await;
    assert_eq!(stats.events_published, 5);
    assert_eq!(stats.events_failed, 0);
    assert_eq!(stats.events_retried, 0);
    assert!(engine.dead_letters().await.is_empty());
}

#[tokio::test]
async fn test_failing_event_is_retried_then_dead_lettered() {
    let engine = EventEngine::new(fast_config());
    engine
        .register_handler("user.registered", Arc::new(FailingHandler::new("broken")))
        .await
        .unwrap();

    engine
        .publish(DomainEvent::user_registered("u-1"))
        .await
        .unwrap();

    let dead = wait_for_dead_letters(&engine, 1).await;
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].reason, "retry limit exhausted");
    // max_retries retries after the initial attempt
    assert_eq!(dead[0].event.attempts, 3);
    assert!(dead[0].event.last_error.as_deref().unwrap().contains("always fails"));

    let stats = engine.get_statistics().await;
    assert_eq!(stats.events_retried, 2);
    assert_eq!(stats.events_failed, 1);
    assert_eq!(stats.events_processed, 0);
    assert_eq!(stats.events_dead_lettered, 1);
}

#[tokio::test]
async fn test_partial_success_is_terminal() {
    let engine = EventEngine::new(fast_config());
    let (counting, calls) = CountingHandler::new("works");
    engine
        .register_handler("job.posted", Arc::new(FailingHandler::new("broken")))
        .await
        .unwrap();
    engine
        .register_handler("job.posted", Arc::new(counting))
        .await
        .unwrap();

    engine
        .publish(DomainEvent::job_posted("j-1", "c-1"))
        .await
        .unwrap();

    let stats = wait_for_stats(&engine, "processed event", |s| s.events_processed == 1).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(stats.events_retried, 0);
    assert_eq!(stats.events_failed, 0);
    assert_eq!(stats.handler_outcomes.get("job.posted:success"), Some(&1));
    assert_eq!(stats.handler_outcomes.get("job.posted:failure"), Some(&1));
    assert!(engine.dead_letters().await.is_empty());
}

#[tokio::test]
async fn test_publish_fails_only_when_queues_full() {
    let config = EventEngineConfig {
        worker_count: 0,
        queue_capacity: 1,
        dead_letter_enabled: false,
        ..fast_config()
    };
    let engine = EventEngine::new(config);

    engine
        .publish(DomainEvent::post_created("p-1", "u-1"))
        .await
        .unwrap();

    let second = DomainEvent::post_created("p-2", "u-1");
    let second_id = second.event_id.clone();
    let err = engine.publish(second).await.unwrap_err();
    match err {
        EventEngineError::QueuesFull { event_id } => assert_eq!(event_id, second_id),
        other => panic!("expected QueuesFull, got {:?}", other),
    }

    let stats = engine.get_statistics().await;
    assert_eq!(stats.events_published, 1);
}

#[tokio::test]
async fn test_publish_overflow_lands_in_dead_letter_queue() {
    let config = EventEngineConfig {
        worker_count: 0,
        queue_capacity: 1,
        ..fast_config()
    };
    let engine = EventEngine::new(config);

    engine
        .publish(DomainEvent::post_created("p-1", "u-1"))
        .await
        .unwrap();
    engine
        .publish(DomainEvent::post_created("p-2", "u-1"))
        .await
        .unwrap();

    let dead = wait_for_dead_letters(&engine, 1).await;
    assert_eq!(dead[0].reason, "processing queue full at publish");
    assert_eq!(dead[0].event.attempts, 0);

    let stats = engine.get_statistics().await;
    assert_eq!(stats.events_published, 2);
}

#[tokio::test]
async fn test_handlers_invoked_in_registration_order() {
    let engine = EventEngine::new(fast_config());
    let record = Arc::new(Mutex::new(Vec::new()));

    for name in ["alpha", "beta", "gamma"] {
        engine
            .register_handler(
                "file.uploaded",
                Arc::new(RecorderHandler {
                    name: name.to_string(),
                    record: Arc::clone(&record),
                }),
            )
            .await
            .unwrap();
    }

    engine
        .publish(DomainEvent::file_uploaded("f-1", "u-1", 1024))
        .await
        .unwrap();
    wait_for_stats(&engine, "first event processed", |s| s.events_processed == 1).await;
    assert_eq!(*record.lock().unwrap(), vec!["alpha", "beta", "gamma"]);

    // Re-registering moves a handler to the end of the order.
    engine
        .unregister_handler("file.uploaded", "alpha")
        .await
        .unwrap();
    engine
        .register_handler(
            "file.uploaded",
            Arc::new(RecorderHandler {
                name: "alpha".to_string(),
                record: Arc::clone(&record),
            }),
        )
        .await
        .unwrap();

    engine
        .publish(DomainEvent::file_uploaded("f-2", "u-1", 2048))
        .await
        .unwrap();
    wait_for_stats(&engine, "second event processed", |s| s.events_processed == 2).await;
    assert_eq!(record.lock().unwrap()[3..], ["beta", "gamma", "alpha"]);
}

#[tokio::test]
async fn test_registration_validation() {
    let engine = EventEngine::new(fast_config());
    let (counting, _) = CountingHandler::new("h");

    let err = engine
        .register_handler("", Arc::new(counting))
        .await
        .unwrap_err();
    assert!(matches!(err, EventEngineError::InvalidRegistration { .. }));
}

#[tokio::test]
async fn test_unregister_unknown_handler_fails() {
    let engine = EventEngine::new(fast_config());
    let (counting, _) = CountingHandler::new("present");
    engine
        .register_handler("post.created", Arc::new(counting))
        .await
        .unwrap();

    let err = engine
        .unregister_handler("post.created", "absent")
        .await
        .unwrap_err();
    assert!(matches!(err, EventEngineError::HandlerNotFound { .. }));

    let err = engine
        .unregister_handler("unknown.type", "present")
        .await
        .unwrap_err();
    assert!(matches!(err, EventEngineError::HandlerNotFound { .. }));

    // Removing the last handler drops the type entry entirely.
    engine
        .unregister_handler("post.created", "present")
        .await
        .unwrap();
    let err = engine
        .unregister_handler("post.created", "present")
        .await
        .unwrap_err();
    assert!(matches!(err, EventEngineError::HandlerNotFound { .. }));
}

#[tokio::test]
async fn test_panicking_handler_is_contained() {
    let engine = EventEngine::new(fast_config());
    let (counting, calls) = CountingHandler::new("survivor");
    engine
        .register_handler("user.registered", Arc::new(PanickingHandler))
        .await
        .unwrap();
    engine
        .register_handler("user.registered", Arc::new(counting))
        .await
        .unwrap();

    engine
        .publish(DomainEvent::user_registered("u-1"))
        .await
        .unwrap();
    engine
        .publish(DomainEvent::user_registered("u-2"))
        .await
        .unwrap();

    // The worker keeps dispatching after the panic, and the panic is a
    // normal handler failure rather than a lost event.
    let stats = wait_for_stats(&engine, "both events processed", |s| s.events_processed == 2).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(stats.handler_outcomes.get("user.registered:failure"), Some(&2));
    assert_eq!(stats.handler_outcomes.get("user.registered:success"), Some(&2));
}

#[tokio::test]
async fn test_slow_handler_attempt_times_out() {
    let config = EventEngineConfig {
        processing_timeout_ms: 30,
        max_retries: 0,
        ..fast_config()
    };
    let engine = EventEngine::new(config);
    engine
        .register_handler(
            "file.uploaded",
            Arc::new(SlowHandler {
                delay: Duration::from_millis(500),
            }),
        )
        .await
        .unwrap();

    engine
        .publish(DomainEvent::file_uploaded("f-1", "u-1", 4096))
        .await
        .unwrap();

    let dead = wait_for_dead_letters(&engine, 1).await;
    assert!(dead[0]
        .event
        .last_error
        .as_deref()
        .unwrap()
        .contains("timed out"));

    let stats = engine.get_statistics().await;
    assert_eq!(stats.events_failed, 1);
    assert_eq!(stats.events_retried, 0);
}

#[tokio::test]
async fn test_exhausted_events_dropped_when_dead_letter_disabled() {
    let config = EventEngineConfig {
        dead_letter_enabled: false,
        max_retries: 1,
        ..fast_config()
    };
    let engine = EventEngine::new(config);
    engine
        .register_handler("job.posted", Arc::new(FailingHandler::new("broken")))
        .await
        .unwrap();

    engine
        .publish(DomainEvent::job_posted("j-1", "c-1"))
        .await
        .unwrap();

    let stats = wait_for_stats(&engine, "terminal failure", |s| s.events_failed == 1).await;
    assert_eq!(stats.events_retried, 1);
    assert_eq!(stats.events_dropped, 1);
    assert!(engine.dead_letters().await.is_empty());
}

#[tokio::test]
async fn test_publish_batch_reports_skipped_and_rejected() {
    let config = EventEngineConfig {
        worker_count: 0,
        queue_capacity: 1,
        dead_letter_enabled: false,
        ..fast_config()
    };
    let engine = EventEngine::new(config);

    let events = vec![
        DomainEvent::post_created("p-1", "u-1"),
        DomainEvent::new(""), // invalid, skipped
        DomainEvent::post_created("p-2", "u-1"),
        DomainEvent::post_created("p-3", "u-1"),
    ];

    let report = engine.publish_batch(events).await;
    assert_eq!(report.published, 1);
    assert_eq!(report.failed, 3);
    assert_eq!(report.failed_event_ids.len(), 3);

    let stats = engine.get_statistics().await;
    assert_eq!(stats.events_published, 1);
}

#[tokio::test]
async fn test_clear_statistics_preserves_handler_count() {
    let engine = EventEngine::new(fast_config());
    let (a, _) = CountingHandler::new("a");
    let (b, _) = CountingHandler::new("b");
    engine
        .register_handler("post.created", Arc::new(a))
        .await
        .unwrap();
    engine
        .register_handler("job.posted", Arc::new(b))
        .await
        .unwrap();

    engine
        .publish(DomainEvent::post_created("p-1", "u-1"))
        .await
        .unwrap();
    wait_for_stats(&engine, "processed event", |s| s.events_processed == 1).await;

    engine.clear_statistics().await;
    let stats = engine.get_statistics().await;
    assert_eq!(stats.events_published, 0);
    assert_eq!(stats.events_processed, 0);
    assert_eq!(stats.active_handlers, 2);
}

#[tokio::test]
async fn test_graceful_shutdown() {
    let mut engine = EventEngine::new(fast_config());
    engine
        .publish(DomainEvent::user_registered("u-1"))
        .await
        .unwrap();
    wait_for_stats(&engine, "processed event", |s| s.events_processed == 1).await;

    engine.shutdown(Duration::from_secs(2)).await.unwrap();

    let err = engine
        .publish(DomainEvent::user_registered("u-2"))
        .await
        .unwrap_err();
    assert!(matches!(err, EventEngineError::EngineStopped));
}

#[tokio::test]
async fn test_shutdown_times_out_with_busy_worker() {
    let config = EventEngineConfig {
        processing_timeout_ms: 10_000,
        ..fast_config()
    };
    let mut engine = EventEngine::new(config);
    engine
        .register_handler(
            "file.uploaded",
            Arc::new(SlowHandler {
                delay: Duration::from_secs(5),
            }),
        )
        .await
        .unwrap();

    engine
        .publish(DomainEvent::file_uploaded("f-1", "u-1", 1))
        .await
        .unwrap();
    // Let the worker pick the event up before asking it to stop.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let err = engine.shutdown(Duration::from_millis(50)).await.unwrap_err();
    assert!(matches!(err, EventEngineError::ShutdownTimeout));
}
