//! Queue abstraction for tasks waiting for a worker slot.

use std::time::{Duration, Instant};

use crate::core::{Priority, SchedulerError, SharedTask, TaskId};

/// A task waiting in the queue.
///
/// Priority is captured when the entry is built, so later
/// [`set_priority`](crate::core::DeferredTask::set_priority) calls do not
/// disturb the heap order.
#[derive(Debug, Clone)]
pub struct QueuedTask {
    /// The task itself.
    pub task: SharedTask,
    /// Priority at submission time.
    pub priority: Priority,
    /// When the task entered the queue.
    pub enqueued_at: Instant,
    /// Instant after which the task is expired instead of run.
    pub deadline: Option<Instant>,
}

impl QueuedTask {
    /// Build a queue entry. The task's own queue timeout wins over
    /// `default_timeout`.
    #[must_use]
    pub fn new(task: SharedTask, default_timeout: Option<Duration>) -> Self {
        let enqueued_at = Instant::now();
        let deadline = task
            .queue_timeout()
            .or(default_timeout)
            .and_then(|timeout| enqueued_at.checked_add(timeout));
        Self {
            priority: task.priority(),
            task,
            enqueued_at,
            deadline,
        }
    }

    /// Id of the wrapped task.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.task.id()
    }

    /// Whether the queue deadline has passed at `now`.
    #[must_use]
    pub fn is_expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }
}

/// Abstraction for queue backends.
///
/// Implementations are not required to be thread-safe themselves; the
/// scheduler keeps the queue behind its own mutex.
pub trait TaskQueue: Send + 'static {
    /// Enqueue a task if space permits.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::QueueFull`] when the maximum depth is
    /// reached.
    fn push(&mut self, entry: QueuedTask) -> Result<(), SchedulerError>;
    /// Remove the highest-priority entry. Equal priorities come out in
    /// submission order.
    fn pop(&mut self) -> Option<QueuedTask>;
    /// Remove every entry, highest priority first.
    fn drain(&mut self) -> Vec<QueuedTask>;
    /// Remove and return entries whose deadline has passed at `now`.
    fn prune_expired(&mut self, now: Instant) -> Vec<QueuedTask>;
    /// Maximum depth allowed, if bounded.
    fn max_depth(&self) -> Option<usize>;
    /// Current depth.
    fn len(&self) -> usize;
    /// Whether no task is waiting.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
