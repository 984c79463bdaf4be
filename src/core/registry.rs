//! Concurrent task-id to status mapping.
//!
//! The registry is the single source of truth for what happened to a task.
//! Entries outlive the tasks themselves until explicitly evicted.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::core::{SchedulerError, TaskId, TaskStatus};

/// Result of a worker trying to take ownership of a popped task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// The task moved `InQueue -> Processing`; the caller must run it.
    Claimed,
    /// The task was no longer queued (e.g. cancelled); skip it.
    Skipped(TaskStatus),
}

#[derive(Debug, Clone)]
struct Entry {
    status: TaskStatus,
    label: Option<String>,
}

/// Thread-safe status registry guarded by a single mutex.
#[derive(Debug, Default)]
pub struct StatusRegistry {
    entries: Mutex<HashMap<TaskId, Entry>>,
}

impl StatusRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly submitted task as `InQueue`.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::DuplicateTask`] if the id is already present.
    pub fn register(&self, id: TaskId) -> Result<(), SchedulerError> {
        self.register_with_label(id, None)
    }

    /// Register a newly submitted task as `InQueue`, remembering its label
    /// for audit events recorded by id alone.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::DuplicateTask`] if the id is already present.
    pub fn register_with_label(
        &self,
        id: TaskId,
        label: Option<&str>,
    ) -> Result<(), SchedulerError> {
        let mut entries = self.entries.lock();
        if entries.contains_key(&id) {
            return Err(SchedulerError::DuplicateTask(id));
        }
        entries.insert(
            id,
            Entry {
                status: TaskStatus::InQueue,
                label: label.map(str::to_owned),
            },
        );
        Ok(())
    }

    /// Current status of `id`.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::UnknownTask`] if the id was never registered.
    pub fn status(&self, id: TaskId) -> Result<TaskStatus, SchedulerError> {
        self.entries
            .lock()
            .get(&id)
            .map(|entry| entry.status.clone())
            .ok_or(SchedulerError::UnknownTask(id))
    }

    /// Label `id` was registered with, if any.
    #[must_use]
    pub fn label(&self, id: TaskId) -> Option<String> {
        self.entries.lock().get(&id).and_then(|entry| entry.label.clone())
    }

    /// Move `id` to `status`, enforcing the lifecycle state machine.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::UnknownTask`] or [`SchedulerError::InvalidTransition`].
    pub fn set_status(&self, id: TaskId, status: TaskStatus) -> Result<(), SchedulerError> {
        let mut entries = self.entries.lock();
        let current = &mut entries
            .get_mut(&id)
            .ok_or(SchedulerError::UnknownTask(id))?
            .status;
        if !current.can_transition_to(&status) {
            return Err(SchedulerError::InvalidTransition {
                id,
                from: current.clone(),
                to: status,
            });
        }
        *current = status;
        Ok(())
    }

    /// Cancel a queued task. Returns the status after the call: `Cancelled`
    /// if the task was still queued, otherwise its unchanged status.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::UnknownTask`] if the id was never registered.
    pub fn cancel(&self, id: TaskId) -> Result<TaskStatus, SchedulerError> {
        self.finish_if_queued(id, TaskStatus::Cancelled)
            .map(|(status, _)| status)
    }

    /// Move a queued task to the terminal status `to` (cancelled, discarded,
    /// expired). Any other current status is left unchanged.
    ///
    /// Returns the status after the call and whether this call changed it.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::UnknownTask`] if the id was never registered.
    pub fn finish_if_queued(
        &self,
        id: TaskId,
        to: TaskStatus,
    ) -> Result<(TaskStatus, bool), SchedulerError> {
        debug_assert!(to.is_terminal());
        let mut entries = self.entries.lock();
        let current = &mut entries
            .get_mut(&id)
            .ok_or(SchedulerError::UnknownTask(id))?
            .status;
        let changed = *current == TaskStatus::InQueue;
        if changed {
            *current = to;
        }
        Ok((current.clone(), changed))
    }

    /// Atomically check-and-move `InQueue -> Processing`.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::UnknownTask`] if the id was never registered.
    pub fn claim(&self, id: TaskId) -> Result<Claim, SchedulerError> {
        let mut entries = self.entries.lock();
        let current = &mut entries
            .get_mut(&id)
            .ok_or(SchedulerError::UnknownTask(id))?
            .status;
        if *current == TaskStatus::InQueue {
            *current = TaskStatus::Processing;
            Ok(Claim::Claimed)
        } else {
            Ok(Claim::Skipped(current.clone()))
        }
    }

    /// Drop a registration without any status check. Used to roll back a
    /// submission the queue refused.
    pub(crate) fn unregister(&self, id: TaskId) {
        self.entries.lock().remove(&id);
    }

    /// Evict a task in a terminal status, returning that status.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::UnknownTask`] or [`SchedulerError::NotTerminal`].
    pub fn forget(&self, id: TaskId) -> Result<TaskStatus, SchedulerError> {
        let mut entries = self.entries.lock();
        let status = &entries.get(&id).ok_or(SchedulerError::UnknownTask(id))?.status;
        if !status.is_terminal() {
            return Err(SchedulerError::NotTerminal {
                id,
                status: status.clone(),
            });
        }
        entries
            .remove(&id)
            .map(|entry| entry.status)
            .ok_or(SchedulerError::UnknownTask(id))
    }

    /// Evict every task in a terminal status. Returns how many were removed.
    pub fn purge_terminal(&self) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.status.is_terminal());
        before - entries.len()
    }

    /// Copy of all entries.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<TaskId, TaskStatus> {
        self.entries
            .lock()
            .iter()
            .map(|(id, entry)| (*id, entry.status.clone()))
            .collect()
    }

    /// Number of tracked tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no task is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
