//! Tests for error types

use deferred_tasks::core::{SchedulerError, TaskError, TaskStatus};

#[test]
fn test_queue_full_error() {
    let err = SchedulerError::QueueFull(16);
    assert_eq!(format!("{}", err), "queue full: max depth 16");
}

#[test]
fn test_unknown_task_error() {
    let err = SchedulerError::UnknownTask(42);
    assert_eq!(format!("{}", err), "unknown task id: 42");
}

#[test]
fn test_stopped_error() {
    let err = SchedulerError::Stopped;
    assert_eq!(format!("{}", err), "scheduler is stopped");
}

#[test]
fn test_not_terminal_error() {
    let err = SchedulerError::NotTerminal {
        id: 3,
        status: TaskStatus::Processing,
    };
    assert_eq!(format!("{}", err), "task 3 is still processing");
}

#[test]
fn test_spawn_error_from_io() {
    let io = std::io::Error::new(std::io::ErrorKind::WouldBlock, "no threads left");
    let err: SchedulerError = io.into();
    assert!(matches!(err, SchedulerError::Spawn(_)));
    assert_eq!(format!("{}", err), "failed to spawn thread: no threads left");
}

#[test]
fn test_task_panicked_error() {
    let err = TaskError::Panicked("boom".to_string());
    assert_eq!(format!("{}", err), "task panicked: boom");
}

#[test]
fn test_task_failed_error() {
    let err = TaskError::from(anyhow::anyhow!("bad input"));
    assert_eq!(format!("{}", err), "task failed: bad input");
}
