//! Priority scheduler with a single admission loop and thread-per-task
//! workers.
//!
//! # Design
//!
//! - **No polling**: the admission loop blocks on `crossbeam_channel`
//!   wake-ups, `stop` blocks on a `Condvar` until the last worker leaves.
//! - **Per-loop halt**: every admission loop owns its halt flag and channel,
//!   so a `start` racing a `stop` never revives the loop being stopped.
//! - **Separate locks**: queue, status registry and the running-worker count
//!   each have their own `parking_lot::Mutex`. When two are held together the
//!   order is always running count, then queue, then registry.
//! - **Unlocked payloads**: no lock is held while a task runs.
//! - **Best-effort cancellation**: cancelling only wins while the task is
//!   still `InQueue`; a worker's claim and a cancel race on the registry lock.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::core::audit::{build_audit_event, AuditAction, AuditSink};
use crate::core::stats::SchedulerCounters;
use crate::core::{
    worker, QueuedTask, SchedulerError, SchedulerStats, SharedTask, StatusRegistry, TaskId,
    TaskQueue, TaskStatus,
};
use crate::infra::queue::InMemoryQueue;

/// How long the admission loop waits before retrying after a worker thread
/// could not be spawned.
const SPAWN_RETRY_DELAY: Duration = Duration::from_millis(50);

static NEXT_SCHEDULER_ID: AtomicU64 = AtomicU64::new(1);

/// State shared between the scheduler handle, the admission loop and the
/// workers.
pub(crate) struct Shared<Q> {
    /// Process-unique, never `0`.
    pub id: u64,
    pub queue: Mutex<Q>,
    pub registry: StatusRegistry,
    /// Number of dispatched workers that have not finished yet.
    pub running: Mutex<usize>,
    /// Notified whenever `running` drops or the queue shrinks.
    pub idle: Condvar,
    /// Submissions are refused while set.
    pub stop: AtomicBool,
    /// New work or a freed slot; capacity one, so wake-ups coalesce.
    pub wake_tx: Sender<()>,
    pub counters: SchedulerCounters,
    pub audit: Option<Arc<dyn AuditSink>>,
    pub max_concurrency: usize,
    pub default_queue_timeout: Option<Duration>,
    pub thread_name_prefix: String,
    pub thread_stack_size: Option<usize>,
}

impl<Q> Shared<Q> {
    /// Wake the admission loop. A pending wake-up already covers this one.
    pub fn wake(&self) {
        match self.wake_tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => {
                debug!("admission wake channel closed");
            }
        }
    }

    /// Forward a lifecycle event to the audit sink, if any.
    pub fn record(&self, task_id: TaskId, action: AuditAction, label: Option<&str>, detail: Option<String>) {
        if let Some(sink) = &self.audit {
            sink.record(build_audit_event(task_id, action, label, detail));
        }
    }

    /// Give a worker slot back, wake drain waiters and the admission loop.
    pub fn release_slot(&self) {
        {
            let mut running = self.running.lock();
            *running = running.saturating_sub(1);
        }
        self.idle.notify_all();
        self.wake();
    }

    /// Mark a popped entry as expired if it is still queued. Returns whether
    /// the status changed.
    fn expire(&self, entry: &QueuedTask) -> bool {
        let id = entry.id();
        match self.registry.finish_if_queued(id, TaskStatus::Expired) {
            Ok((_, true)) => {
                SchedulerCounters::bump(&self.counters.expired);
                let waited = entry.enqueued_at.elapsed();
                warn!(task_id = id, waited_ms = waited.as_millis(), "task expired in queue");
                self.record(
                    id,
                    AuditAction::Expired,
                    entry.task.label(),
                    Some(format!("waited {}ms", waited.as_millis())),
                );
                true
            }
            Ok((status, false)) => {
                debug!(task_id = id, status = %status, "dropping expired entry no longer queued");
                false
            }
            Err(e) => {
                error!(task_id = id, error = %e, "queued task missing from status registry");
                false
            }
        }
    }
}

/// Priority-ordered deferred task scheduler.
///
/// Tasks are submitted into a priority queue and dispatched by a single
/// admission loop to at most `max_concurrency` worker threads, one thread per
/// task.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
///
/// use deferred_tasks::config::SchedulerConfig;
/// use deferred_tasks::core::{DeferredTask, Scheduler, TaskStatus};
///
/// let scheduler = Scheduler::new(SchedulerConfig::new().with_max_concurrency(4))?;
/// scheduler.start()?;
///
/// let task = DeferredTask::new(|| {
///     println!("hello from a worker");
///     Ok(())
/// })
/// .with_priority(80);
/// let id = scheduler.submit(task)?;
///
/// scheduler.wait_idle(Duration::from_secs(1));
/// scheduler.stop();
/// assert_eq!(scheduler.status(id)?, TaskStatus::Done);
/// # Ok::<(), deferred_tasks::core::SchedulerError>(())
/// ```
pub struct Scheduler<Q: TaskQueue = InMemoryQueue> {
    shared: Arc<Shared<Q>>,
    wake_rx: Receiver<()>,
    admission: Mutex<Option<Admission>>,
}

/// A running admission loop, owned by the scheduler handle.
struct Admission {
    handle: JoinHandle<()>,
    halt: Arc<AtomicBool>,
    /// Dropped to wake this loop only.
    halt_tx: Sender<()>,
}

/// What an admission loop listens to.
struct LoopControl {
    halt: Arc<AtomicBool>,
    halt_rx: Receiver<()>,
    wake_rx: Receiver<()>,
}

impl LoopControl {
    fn halted(&self) -> bool {
        self.halt.load(Ordering::Acquire)
    }
}

impl Scheduler<InMemoryQueue> {
    /// Create a scheduler backed by an [`InMemoryQueue`].
    ///
    /// # Errors
    ///
    /// [`SchedulerError::InvalidConfig`] if the configuration is invalid.
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        let queue = config
            .max_queue_depth
            .map_or_else(InMemoryQueue::new, InMemoryQueue::bounded);
        Self::with_queue(config, queue, None)
    }

    /// Create a scheduler with default configuration.
    ///
    /// # Errors
    ///
    /// Never fails for the default configuration; kept fallible for symmetry
    /// with [`new`](Self::new).
    pub fn with_defaults() -> Result<Self, SchedulerError> {
        Self::new(SchedulerConfig::default())
    }
}

impl<Q: TaskQueue> Scheduler<Q> {
    /// Create a scheduler over a custom queue backend and optional audit sink.
    ///
    /// `config.max_queue_depth` is not applied to a custom queue; bound the
    /// backend itself.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::InvalidConfig`] if the configuration is invalid.
    pub fn with_queue(
        config: SchedulerConfig,
        queue: Q,
        audit: Option<Arc<dyn AuditSink>>,
    ) -> Result<Self, SchedulerError> {
        config.validate().map_err(SchedulerError::InvalidConfig)?;
        let max_concurrency = config.resolved_max_concurrency();
        let (wake_tx, wake_rx) = bounded(1);

        info!(
            max_concurrency = max_concurrency,
            max_queue_depth = ?queue.max_depth(),
            "scheduler initialized"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                id: NEXT_SCHEDULER_ID.fetch_add(1, Ordering::Relaxed),
                queue: Mutex::new(queue),
                registry: StatusRegistry::new(),
                running: Mutex::new(0),
                idle: Condvar::new(),
                stop: AtomicBool::new(false),
                wake_tx,
                counters: SchedulerCounters::default(),
                audit,
                max_concurrency,
                default_queue_timeout: config.default_queue_timeout(),
                thread_name_prefix: config.thread_name_prefix,
                thread_stack_size: config.thread_stack_size,
            }),
            wake_rx,
            admission: Mutex::new(None),
        })
    }

    /// Start the admission loop on its own thread and accept submissions
    /// again if the scheduler was stopped.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::AlreadyRunning`] if the loop is already running,
    /// [`SchedulerError::Spawn`] if its thread could not be created.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let mut admission = self.admission.lock();
        if admission.is_some() {
            return Err(SchedulerError::AlreadyRunning);
        }

        let halt = Arc::new(AtomicBool::new(false));
        let (halt_tx, halt_rx) = bounded(1);
        let control = LoopControl {
            halt: Arc::clone(&halt),
            halt_rx,
            wake_rx: self.wake_rx.clone(),
        };
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name(format!("{}-admission", self.shared.thread_name_prefix))
            .spawn(move || admission_loop(&shared, &control))?;

        self.shared.stop.store(false, Ordering::Release);
        *admission = Some(Admission {
            handle,
            halt,
            halt_tx,
        });

        info!(max_concurrency = self.shared.max_concurrency, "scheduler started");
        Ok(())
    }

    /// Stop dispatching and block until every in-flight worker finished.
    ///
    /// Queued tasks stay queued and run after the next [`start`](Self::start).
    /// Submissions are refused until then. Calling `stop` from inside a task
    /// payload of this scheduler stops the loop but does not wait for the
    /// drain, since the calling worker would wait for itself.
    pub fn stop(&self) {
        let admission = {
            let mut admission = self.admission.lock();
            self.shared.stop.store(true, Ordering::Release);
            admission.take()
        };

        if let Some(Admission {
            handle,
            halt,
            halt_tx,
        }) = admission
        {
            halt.store(true, Ordering::Release);
            drop(halt_tx);
            if handle.join().is_err() {
                error!("admission loop panicked");
            }
        }

        if worker::is_worker_of(&self.shared) {
            warn!("stop called from a task payload; not waiting for in-flight workers");
            return;
        }

        let mut running = self.shared.running.lock();
        while *running > 0 {
            self.shared.idle.wait(&mut running);
        }
        drop(running);
        info!("scheduler stopped");
    }

    /// Queue a task for execution.
    ///
    /// The task is registered as `InQueue` before it becomes visible to the
    /// admission loop.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::Stopped`] after [`stop`](Self::stop),
    /// [`SchedulerError::QueueFull`] if the queue is at its maximum depth,
    /// [`SchedulerError::DuplicateTask`] if the task was submitted before.
    pub fn submit(&self, task: impl Into<SharedTask>) -> Result<TaskId, SchedulerError> {
        let task: SharedTask = task.into();
        let id = task.id();

        if self.shared.stop.load(Ordering::Acquire) {
            SchedulerCounters::bump(&self.shared.counters.rejected);
            warn!(task_id = id, "task rejected: scheduler is stopped");
            return Err(SchedulerError::Stopped);
        }

        self.shared.registry.register_with_label(id, task.label())?;

        let entry = QueuedTask::new(task, self.shared.default_queue_timeout);
        let priority = entry.priority;
        {
            let mut queue = self.shared.queue.lock();
            let label = entry.task.label().map(str::to_owned);
            if let Err(e) = queue.push(entry) {
                drop(queue);
                self.shared.registry.unregister(id);
                SchedulerCounters::bump(&self.shared.counters.rejected);
                warn!(task_id = id, error = %e, "task rejected");
                return Err(e);
            }
            // Recorded under the queue lock so it precedes any `Started`.
            self.shared.record(
                id,
                AuditAction::Submitted,
                label.as_deref(),
                Some(format!("priority={priority}")),
            );
        }

        SchedulerCounters::bump(&self.shared.counters.submitted);
        debug!(task_id = id, priority = priority.value(), "task submitted");
        self.shared.wake();
        Ok(id)
    }

    /// Cancel a task that has not been claimed by a worker yet.
    ///
    /// Returns `Cancelled` on success, or the current status unchanged if the
    /// task is already processing or finished. The task stays in the queue
    /// and is skipped when popped.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::UnknownTask`] if `id` was never submitted.
    pub fn cancel(&self, id: TaskId) -> Result<TaskStatus, SchedulerError> {
        let (status, changed) = self
            .shared
            .registry
            .finish_if_queued(id, TaskStatus::Cancelled)?;
        if changed {
            SchedulerCounters::bump(&self.shared.counters.cancelled);
            debug!(task_id = id, "task cancelled");
            let label = self.shared.registry.label(id);
            self.shared
                .record(id, AuditAction::Cancelled, label.as_deref(), None);
        }
        Ok(status)
    }

    /// Current status of a task.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::UnknownTask`] if `id` was never submitted.
    pub fn status(&self, id: TaskId) -> Result<TaskStatus, SchedulerError> {
        self.shared.registry.status(id)
    }

    /// Stop (with full drain), then drop every queued task without running
    /// it. Tasks still `InQueue` become `Discarded`; cancelled ones keep
    /// their status. Returns the number of tasks discarded.
    pub fn release_all(&self) -> usize {
        self.stop();

        let drained = self.take_queued(|queue| queue.drain());
        let total = drained.len();
        let mut discarded = 0;
        for entry in drained {
            let id = entry.id();
            match self
                .shared
                .registry
                .finish_if_queued(id, TaskStatus::Discarded)
            {
                Ok((_, true)) => {
                    discarded += 1;
                    SchedulerCounters::bump(&self.shared.counters.discarded);
                    self.shared
                        .record(id, AuditAction::Discarded, entry.task.label(), None);
                }
                Ok((_, false)) => {}
                Err(e) => error!(task_id = id, error = %e, "queued task missing from status registry"),
            }
        }

        info!(released = total, discarded = discarded, "released all queued tasks");
        discarded
    }

    /// Remove queued tasks whose queue timeout elapsed, marking them
    /// `Expired`. Returns how many were expired.
    ///
    /// The admission loop also expires tasks lazily when it pops them; this
    /// is for callers who want the queue cleaned eagerly.
    pub fn prune_expired(&self) -> usize {
        let now = Instant::now();
        let pruned = self.take_queued(|queue| queue.prune_expired(now));
        pruned
            .iter()
            .filter(|entry| self.shared.expire(entry))
            .count()
    }

    /// Remove entries from the queue while holding the running-count lock,
    /// the lock [`wait_idle`](Self::wait_idle) checks the queue under.
    fn take_queued<F>(&self, take: F) -> Vec<QueuedTask>
    where
        F: FnOnce(&mut Q) -> Vec<QueuedTask>,
    {
        let running = self.shared.running.lock();
        let taken = {
            let mut queue = self.shared.queue.lock();
            take(&mut *queue)
        };
        drop(running);
        if !taken.is_empty() {
            self.shared.idle.notify_all();
        }
        taken
    }

    /// Block until no task is queued and no worker is running, or until
    /// `timeout` elapses. Returns whether the scheduler went idle.
    ///
    /// Cancelled tasks still sitting in the queue count as queued until a
    /// worker pops them, so this only returns `true` early on a started
    /// scheduler.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut running = self.shared.running.lock();
        loop {
            if *running == 0 && self.shared.queue.lock().is_empty() {
                return true;
            }
            if self
                .shared
                .idle
                .wait_until(&mut running, deadline)
                .timed_out()
            {
                return *running == 0 && self.shared.queue.lock().is_empty();
            }
        }
    }

    /// Evict a finished task from the status registry.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::UnknownTask`], or [`SchedulerError::NotTerminal`]
    /// while the task is queued or processing.
    pub fn forget(&self, id: TaskId) -> Result<TaskStatus, SchedulerError> {
        self.shared.registry.forget(id)
    }

    /// Evict every finished task from the status registry.
    pub fn purge_terminal(&self) -> usize {
        self.shared.registry.purge_terminal()
    }

    /// Get current scheduler statistics.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        self.shared.counters.snapshot(
            self.shared.max_concurrency,
            self.running_workers(),
            self.queued_tasks(),
        )
    }

    /// Workers currently dispatched and not yet finished.
    #[must_use]
    pub fn running_workers(&self) -> usize {
        *self.shared.running.lock()
    }

    /// Tasks physically in the queue, cancelled ones included.
    #[must_use]
    pub fn queued_tasks(&self) -> usize {
        self.shared.queue.lock().len()
    }

    /// Maximum concurrent workers.
    #[must_use]
    pub fn max_concurrency(&self) -> usize {
        self.shared.max_concurrency
    }

    /// Whether the admission loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.admission.lock().is_some()
    }

    /// Whether submissions are currently refused.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.shared.stop.load(Ordering::Acquire)
    }
}

impl<Q: TaskQueue> std::fmt::Debug for Scheduler<Q> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("max_concurrency", &self.max_concurrency())
            .field("running", &self.is_running())
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "tokio-runtime")]
impl<Q: TaskQueue> Scheduler<Q> {
    /// [`stop`](Self::stop) without blocking the async runtime: the drain
    /// wait runs on tokio's blocking thread pool.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::Runtime`] if the blocking task could not complete.
    pub async fn stop_async(self: Arc<Self>) -> Result<(), SchedulerError> {
        tokio::task::spawn_blocking(move || self.stop())
            .await
            .map_err(|e| SchedulerError::Runtime(e.to_string()))
    }

    /// [`release_all`](Self::release_all) on tokio's blocking thread pool.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::Runtime`] if the blocking task could not complete.
    pub async fn release_all_async(self: Arc<Self>) -> Result<usize, SchedulerError> {
        tokio::task::spawn_blocking(move || self.release_all())
            .await
            .map_err(|e| SchedulerError::Runtime(e.to_string()))
    }
}

impl<Q: TaskQueue> Drop for Scheduler<Q> {
    fn drop(&mut self) {
        let discarded = self.release_all();
        if discarded > 0 {
            debug!(discarded = discarded, "scheduler dropped with queued tasks");
        }
    }
}

/// Admission loop: dispatch whatever fits, then sleep until woken or
/// halted.
fn admission_loop<Q: TaskQueue>(shared: &Arc<Shared<Q>>, control: &LoopControl) {
    debug!("admission loop started");
    while !control.halted() {
        if dispatch_ready(shared, &control.halt) {
            select! {
                recv(control.wake_rx) -> _ => {},
                recv(control.halt_rx) -> _ => {},
                default(SPAWN_RETRY_DELAY) => debug!("retrying dispatch after spawn failure"),
            }
        } else {
            select! {
                recv(control.wake_rx) -> _ => {},
                recv(control.halt_rx) -> _ => {},
            }
        }
    }
    // A loop started after this one may be waiting on a wake-up consumed here.
    shared.wake();
    debug!("admission loop exiting");
}

/// Pop and dispatch tasks while slots are free and the queue is not empty.
/// Returns whether dispatch stopped on a worker spawn failure.
fn dispatch_ready<Q: TaskQueue>(shared: &Arc<Shared<Q>>, halt: &AtomicBool) -> bool {
    loop {
        if halt.load(Ordering::Acquire) {
            return false;
        }

        let next = {
            let mut running = shared.running.lock();
            if *running >= shared.max_concurrency {
                return false;
            }
            let now = Instant::now();
            let mut expired = Vec::new();
            let next = {
                let mut queue = shared.queue.lock();
                loop {
                    match queue.pop() {
                        Some(entry) if entry.is_expired(now) => expired.push(entry),
                        other => break other,
                    }
                }
            };
            for entry in &expired {
                shared.expire(entry);
            }
            if next.is_some() {
                // Reserved under the same lock `wait_idle` checks, so the
                // popped task is never invisible to it.
                *running += 1;
            }
            drop(running);
            if !expired.is_empty() {
                shared.idle.notify_all();
            }
            next
        };

        let Some(entry) = next else {
            return false;
        };

        let id = entry.id();
        debug!(
            task_id = id,
            priority = entry.priority.value(),
            "dispatching task"
        );
        if let Err(e) = worker::spawn_worker(shared, entry.clone()) {
            error!(task_id = id, error = %e, "failed to spawn worker thread; requeueing task");
            requeue_unspawned(shared, entry);
            return true;
        }
    }
}

/// Put back an entry whose worker never started and free its reserved
/// slot, both under the running-count lock.
fn requeue_unspawned<Q: TaskQueue>(shared: &Shared<Q>, entry: QueuedTask) {
    let id = entry.id();
    let label = entry.task.label().map(str::to_owned);
    let mut running = shared.running.lock();
    let requeued = shared.queue.lock().push(entry);
    *running = running.saturating_sub(1);
    drop(running);
    shared.idle.notify_all();

    if let Err(e) = requeued {
        error!(task_id = id, error = %e, "failed to requeue task; discarding it");
        if let Ok((_, true)) = shared.registry.finish_if_queued(id, TaskStatus::Discarded) {
            SchedulerCounters::bump(&shared.counters.discarded);
            shared.record(id, AuditAction::Discarded, label.as_deref(), None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DeferredTask;

    fn scheduler() -> Scheduler {
        Scheduler::new(SchedulerConfig::new().with_max_concurrency(1)).unwrap()
    }

    #[test]
    fn test_requeue_frees_reserved_slot() {
        let scheduler = scheduler();
        let task = DeferredTask::new(|| Ok(())).with_priority(60);
        let id = scheduler.submit(task).unwrap();

        let entry = scheduler.shared.queue.lock().pop().unwrap();
        *scheduler.shared.running.lock() += 1;

        requeue_unspawned(&scheduler.shared, entry);

        assert_eq!(scheduler.running_workers(), 0);
        assert_eq!(scheduler.queued_tasks(), 1);
        assert_eq!(scheduler.status(id).unwrap(), TaskStatus::InQueue);
        assert_eq!(scheduler.shared.queue.lock().pop().unwrap().id(), id);
    }

    #[test]
    fn test_requeue_into_full_queue_discards() {
        let scheduler =
            Scheduler::new(SchedulerConfig::new().with_max_concurrency(1).with_max_queue_depth(1))
                .unwrap();
        let first = scheduler.submit(DeferredTask::new(|| Ok(()))).unwrap();
        let entry = scheduler.shared.queue.lock().pop().unwrap();
        *scheduler.shared.running.lock() += 1;
        let second = scheduler.submit(DeferredTask::new(|| Ok(()))).unwrap();

        requeue_unspawned(&scheduler.shared, entry);

        assert_eq!(scheduler.running_workers(), 0);
        assert_eq!(scheduler.status(first).unwrap(), TaskStatus::Discarded);
        assert_eq!(scheduler.status(second).unwrap(), TaskStatus::InQueue);
        assert_eq!(scheduler.stats().discarded, 1);
    }

    #[test]
    fn test_scheduler_ids_are_distinct() {
        let a = scheduler();
        let b = scheduler();
        assert_ne!(a.shared.id, 0);
        assert_ne!(a.shared.id, b.shared.id);
        assert!(!worker::is_worker_of(&a.shared));
    }

    #[test]
    fn test_stopped_loop_forwards_wake_up() {
        let scheduler = scheduler();
        scheduler.start().unwrap();
        scheduler.stop();
        assert!(scheduler.wake_rx.try_recv().is_ok());
    }
}
