//! Tests for builder modules

use std::sync::Arc;
use std::time::Duration;

use deferred_tasks::builders::SchedulerBuilder;
use deferred_tasks::config::SchedulerConfig;
use deferred_tasks::core::{DeferredTask, InMemoryAuditSink, SchedulerError, TaskStatus};
use deferred_tasks::infra::InMemoryQueue;

#[test]
fn test_scheduler_builder_defaults() {
    let builder = SchedulerBuilder::new();
    assert_eq!(builder.config(), &SchedulerConfig::default());
    let scheduler = builder.build().unwrap();
    assert!(scheduler.max_concurrency() >= 2);
}

#[test]
fn test_scheduler_builder_from_config() {
    let config = SchedulerConfig::new().with_max_concurrency(5);
    let scheduler = SchedulerBuilder::from_config(config).build().unwrap();
    assert_eq!(scheduler.max_concurrency(), 5);
}

#[test]
fn test_scheduler_builder_queue_depth() {
    let scheduler = SchedulerBuilder::new()
        .with_max_queue_depth(1)
        .build()
        .unwrap();
    scheduler.submit(DeferredTask::new(|| Ok(()))).unwrap();
    let err = scheduler.submit(DeferredTask::new(|| Ok(()))).unwrap_err();
    assert!(matches!(err, SchedulerError::QueueFull(1)));
}

#[test]
fn test_scheduler_builder_custom_queue_and_audit() {
    let sink = InMemoryAuditSink::new(32);
    let scheduler = SchedulerBuilder::new()
        .with_max_concurrency(1)
        .with_audit(Arc::new(sink.clone()))
        .build_with_queue(InMemoryQueue::bounded(4))
        .unwrap();
    scheduler.start().unwrap();

    let id = scheduler.submit(DeferredTask::new(|| Ok(()))).unwrap();
    assert!(scheduler.wait_idle(Duration::from_secs(5)));
    assert_eq!(scheduler.status(id).unwrap(), TaskStatus::Done);
    assert!(!sink.events_for(id).is_empty());
}
