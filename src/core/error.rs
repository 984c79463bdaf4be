//! Error types for scheduler operations and task payloads.

use thiserror::Error;

use crate::core::{TaskId, TaskStatus};

/// Errors produced by scheduler components.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The task id was never registered (or has been forgotten).
    #[error("unknown task id: {0}")]
    UnknownTask(TaskId),
    /// The scheduler has been stopped and no longer accepts tasks.
    #[error("scheduler is stopped")]
    Stopped,
    /// `start` was called while the admission loop is already running.
    #[error("scheduler is already running")]
    AlreadyRunning,
    /// The queue reached its configured maximum depth.
    #[error("queue full: max depth {0}")]
    QueueFull(usize),
    /// The same task was submitted twice.
    #[error("task {0} was already submitted")]
    DuplicateTask(TaskId),
    /// The status state machine does not allow this transition.
    #[error("task {id}: invalid status transition {from} -> {to}")]
    InvalidTransition {
        /// Task identifier.
        id: TaskId,
        /// Current status.
        from: TaskStatus,
        /// Requested status.
        to: TaskStatus,
    },
    /// The task has not reached a terminal status yet.
    #[error("task {id} is still {status}")]
    NotTerminal {
        /// Task identifier.
        id: TaskId,
        /// Current status.
        status: TaskStatus,
    },
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A blocking operation could not be completed on the async runtime.
    #[error("async runtime error: {0}")]
    Runtime(String),
    /// An OS thread could not be spawned.
    #[error("failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Outcome of running a task payload, as seen by the worker.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The payload returned an error.
    #[error("task failed: {0:#}")]
    Failed(#[from] anyhow::Error),
    /// The payload panicked.
    #[error("task panicked: {0}")]
    Panicked(String),
    /// The payload was already taken by an earlier run.
    #[error("task payload already ran")]
    AlreadyRun,
    /// The async runtime for the payload could not be built.
    #[error("task runtime error: {0}")]
    Runtime(String),
}

/// Result returned by task payloads.
pub type TaskResult = Result<(), anyhow::Error>;

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
