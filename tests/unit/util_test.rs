//! Tests for utility functions

use deferred_tasks::core::{DeferredTask, Priority, TaskId};
use deferred_tasks::util::{init_tracing, now_ms};

#[test]
fn test_priority_ordering() {
    assert!(Priority::MAX > Priority::from(50));
    assert!(Priority::from(50) > Priority::MIN);
    assert_eq!(Priority::new(250), Priority::MAX);
    assert_eq!(Priority::new(-5), Priority::MIN);
}

#[test]
fn test_now_ms_is_monotonic_enough() {
    let a = now_ms();
    let b = now_ms();
    assert!(b >= a);
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
}

#[test]
fn test_task_ids_strictly_increasing() {
    let ids: Vec<TaskId> = (0..16).map(|_| DeferredTask::new(|| Ok(())).id()).collect();
    assert!(ids[0] >= 1);
    assert!(ids.windows(2).all(|pair| pair[0] < pair[1]), "{ids:?}");
}
