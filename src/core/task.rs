//! Deferred tasks: identity, priority and the payload to invoke later.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::core::{TaskError, TaskResult};

/// Unique task identifier.
pub type TaskId = u64;

/// Shared handle to a task. The scheduler keeps its own clone until the task
/// leaves the queue.
pub type SharedTask = Arc<DeferredTask>;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate the next process-wide task id. Starts at 1 and never repeats.
fn next_task_id() -> TaskId {
    NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed)
}

/// Task priority in `[0, 100]`. Higher values run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Priority(u8);

impl Priority {
    /// Lowest priority, also the default.
    pub const MIN: Self = Self(0);
    /// Highest priority.
    pub const MAX: Self = Self(100);

    /// Build a priority, clamping `value` into `[0, 100]`.
    #[must_use]
    pub fn new(value: i64) -> Self {
        let clamped = value.clamp(i64::from(Self::MIN.0), i64::from(Self::MAX.0));
        Self(u8::try_from(clamped).unwrap_or(Self::MAX.0))
    }

    /// Numeric value.
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }
}

impl From<i32> for Priority {
    fn from(value: i32) -> Self {
        Self::new(i64::from(value))
    }
}

impl From<u8> for Priority {
    fn from(value: u8) -> Self {
        Self::new(i64::from(value))
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Blocking unit of work. Implemented for every `FnOnce() -> TaskResult`.
///
/// Runs on a dedicated worker thread, so blocking I/O and CPU-bound work are
/// both fine here.
pub trait Job: Send + 'static {
    /// Consume the job and run it.
    fn run(self: Box<Self>) -> TaskResult;
}

impl<F> Job for F
where
    F: FnOnce() -> TaskResult + Send + 'static,
{
    fn run(self: Box<Self>) -> TaskResult {
        (*self)()
    }
}

/// Async unit of work, driven to completion on a current-thread tokio
/// runtime owned by the worker thread.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use deferred_tasks::core::{AsyncJob, TaskResult};
///
/// struct Refresh {
///     url: String,
/// }
///
/// #[async_trait]
/// impl AsyncJob for Refresh {
///     async fn run(&self) -> TaskResult {
///         fetch(&self.url).await?;
///         Ok(())
///     }
/// }
/// ```
#[cfg(feature = "tokio-runtime")]
#[async_trait::async_trait]
pub trait AsyncJob: Send + Sync + 'static {
    /// Run the job. Called at most once per task.
    async fn run(&self) -> TaskResult;
}

#[cfg(feature = "tokio-runtime")]
#[async_trait::async_trait]
impl<F, Fut> AsyncJob for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = TaskResult> + Send + 'static,
{
    async fn run(&self) -> TaskResult {
        (self)().await
    }
}

enum Payload {
    Blocking(Box<dyn Job>),
    #[cfg(feature = "tokio-runtime")]
    Async(Box<dyn AsyncJob>),
}

/// A unit of deferred work with a priority and a unique id.
///
/// The payload is invoked at most once. Priority may be adjusted through a
/// shared reference; the queue reads it when the task is submitted.
pub struct DeferredTask {
    id: TaskId,
    priority: AtomicU8,
    payload: Mutex<Option<Payload>>,
    queue_timeout: Option<Duration>,
    label: Option<String>,
}

impl DeferredTask {
    /// Create a task running `f` on a worker thread, with the lowest
    /// priority.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() -> TaskResult + Send + 'static,
    {
        Self::from_job(f)
    }

    /// Create a task from any [`Job`] implementation.
    pub fn from_job<J: Job>(job: J) -> Self {
        Self::with_payload(Payload::Blocking(Box::new(job)))
    }

    /// Create a task driving the future returned by `f`, with the lowest
    /// priority.
    #[cfg(feature = "tokio-runtime")]
    pub fn new_async<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = TaskResult> + Send + 'static,
    {
        Self::from_async_job(f)
    }

    /// Create a task from any [`AsyncJob`] implementation.
    #[cfg(feature = "tokio-runtime")]
    pub fn from_async_job<J: AsyncJob>(job: J) -> Self {
        Self::with_payload(Payload::Async(Box::new(job)))
    }

    fn with_payload(payload: Payload) -> Self {
        Self {
            id: next_task_id(),
            priority: AtomicU8::new(Priority::MIN.value()),
            payload: Mutex::new(Some(payload)),
            queue_timeout: None,
            label: None,
        }
    }

    /// Set the initial priority (clamped).
    #[must_use]
    pub fn with_priority(self, priority: impl Into<Priority>) -> Self {
        self.set_priority(priority);
        self
    }

    /// Expire the task instead of running it if it waits in the queue longer
    /// than `timeout`.
    #[must_use]
    pub fn with_queue_timeout(mut self, timeout: Duration) -> Self {
        self.queue_timeout = Some(timeout);
        self
    }

    /// Attach a human-readable label used in logs and audit events.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Wrap the task for submission.
    #[must_use]
    pub fn into_shared(self) -> SharedTask {
        Arc::new(self)
    }

    /// Change the priority (clamped). Has no effect on a task that is
    /// already queued.
    pub fn set_priority(&self, priority: impl Into<Priority>) {
        self.priority.store(priority.into().value(), Ordering::Relaxed);
    }

    /// Current priority.
    #[must_use]
    pub fn priority(&self) -> Priority {
        Priority(self.priority.load(Ordering::Relaxed))
    }

    /// Unique id.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Optional label.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Queue timeout, if any.
    #[must_use]
    pub const fn queue_timeout(&self) -> Option<Duration> {
        self.queue_timeout
    }

    /// Whether the payload has already been taken by [`run`](Self::run).
    #[must_use]
    pub fn has_run(&self) -> bool {
        self.payload.lock().is_none()
    }

    /// Invoke the payload.
    ///
    /// The payload is taken out under a brief lock, so a second call (or a
    /// concurrent one) gets [`TaskError::AlreadyRun`] instead of running it
    /// twice. Async payloads get their own current-thread runtime, so this
    /// must not be called from inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Failed`] with the payload's own error,
    /// [`TaskError::AlreadyRun`], or [`TaskError::Runtime`] if the async
    /// runtime could not be built. Panics in the payload are not caught here.
    pub fn run(&self) -> Result<(), TaskError> {
        let payload = self.payload.lock().take().ok_or(TaskError::AlreadyRun)?;
        match payload {
            Payload::Blocking(job) => job.run().map_err(TaskError::from),
            #[cfg(feature = "tokio-runtime")]
            Payload::Async(job) => {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(|e| TaskError::Runtime(e.to_string()))?;
                rt.block_on(job.run()).map_err(TaskError::from)
            }
        }
    }
}

impl fmt::Debug for DeferredTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredTask")
            .field("id", &self.id)
            .field("priority", &self.priority())
            .field("label", &self.label)
            .field("queue_timeout", &self.queue_timeout)
            .field("has_run", &self.has_run())
            .finish()
    }
}
