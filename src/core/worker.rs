//! Per-task worker threads.
//!
//! Each dispatched task gets its own OS thread. The worker claims the task in
//! the status registry, runs the payload with no lock held and records the
//! outcome. The worker slot is always given back, even if the payload panics.

use std::any::Any;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use tracing::{debug, warn};

use crate::core::audit::AuditAction;
use crate::core::registry::Claim;
use crate::core::scheduler::Shared;
use crate::core::stats::SchedulerCounters;
use crate::core::{QueuedTask, TaskError, TaskQueue, TaskStatus};

thread_local! {
    /// Id of the scheduler owning this worker thread; `0` off workers.
    static OWNER: Cell<u64> = const { Cell::new(0) };
}

/// Whether the current thread is a worker dispatched by `shared`.
pub(crate) fn is_worker_of<Q>(shared: &Shared<Q>) -> bool {
    OWNER.with(Cell::get) == shared.id
}

/// Releases the worker slot when the worker exits, however it exits.
struct SlotGuard<Q> {
    shared: Arc<Shared<Q>>,
}

impl<Q> Drop for SlotGuard<Q> {
    fn drop(&mut self) {
        self.shared.release_slot();
    }
}

/// Spawn a worker thread for an entry whose slot is already reserved.
///
/// On error the slot is still reserved and the entry was not run; the caller
/// owns the rollback.
pub(crate) fn spawn_worker<Q: TaskQueue>(
    shared: &Arc<Shared<Q>>,
    entry: QueuedTask,
) -> std::io::Result<()> {
    let mut builder =
        thread::Builder::new().name(format!("{}-{}", shared.thread_name_prefix, entry.id()));
    if let Some(size) = shared.thread_stack_size {
        builder = builder.stack_size(size);
    }

    let shared = Arc::clone(shared);
    builder.spawn(move || {
        OWNER.with(|owner| owner.set(shared.id));
        let guard = SlotGuard { shared };
        execute(&guard.shared, entry);
    })?;
    Ok(())
}

/// Claim, run and record a single task.
fn execute<Q>(shared: &Shared<Q>, entry: QueuedTask) {
    let task = entry.task;
    let id = task.id();

    // A dispatched task is always registered; anything else is a bug.
    let claim = match shared.registry.claim(id) {
        Ok(claim) => claim,
        Err(e) => panic!("dispatched task {id} is not tracked by the status registry: {e}"),
    };
    if let Claim::Skipped(status) = claim {
        debug!(task_id = id, status = %status, "skipping task that is no longer queued");
        shared.record(id, AuditAction::Skipped, task.label(), Some(status.to_string()));
        return;
    }

    let waited = entry.enqueued_at.elapsed();
    debug!(
        task_id = id,
        priority = entry.priority.value(),
        waited_ms = waited.as_millis(),
        "worker executing task"
    );
    shared.record(
        id,
        AuditAction::Started,
        task.label(),
        Some(format!("priority={}", entry.priority)),
    );

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| task.run()))
        .unwrap_or_else(|payload| Err(TaskError::Panicked(panic_message(payload.as_ref()))));

    let status = match outcome {
        Ok(()) => {
            SchedulerCounters::bump(&shared.counters.completed);
            debug!(task_id = id, "worker completed task");
            shared.record(id, AuditAction::Completed, task.label(), None);
            TaskStatus::Done
        }
        Err(e) => {
            let reason = e.to_string();
            SchedulerCounters::bump(&shared.counters.failed);
            warn!(task_id = id, error = %reason, "task failed");
            shared.record(id, AuditAction::Failed, task.label(), Some(reason.clone()));
            TaskStatus::Failed(reason)
        }
    };

    if let Err(e) = shared.registry.set_status(id, status) {
        panic!("task {id} left Processing while its worker was running: {e}");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned())
}
