//! Audit sink implementations.
//!
//! Every lifecycle transition the scheduler performs is reported to an
//! optional [`AuditSink`]: in memory for tests and diagnostics, or forwarded
//! to `tracing` for production logs.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::TaskId;
use crate::util::clock::now_ms;

/// Lifecycle step recorded in an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Task accepted into the queue.
    Submitted,
    /// Worker claimed the task and started the payload.
    Started,
    /// Payload finished successfully.
    Completed,
    /// Payload returned an error or panicked.
    Failed,
    /// Task cancelled while queued.
    Cancelled,
    /// Task skipped by a worker because it was no longer queued.
    Skipped,
    /// Queue timeout elapsed before a worker claimed the task.
    Expired,
    /// Task dropped from the queue by `release_all`.
    Discarded,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Submitted => "submitted",
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Skipped => "skipped",
            Self::Expired => "expired",
            Self::Discarded => "discarded",
        };
        f.write_str(name)
    }
}

/// Audit event structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Related task identifier.
    pub task_id: TaskId,
    /// Lifecycle step.
    pub action: AuditAction,
    /// Task label, if one was set.
    pub label: Option<String>,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
    /// Additional context (failure reason, priority, ...).
    pub detail: Option<String>,
}

/// Audit sink abstraction.
pub trait AuditSink: Send + Sync {
    /// Record an audit event.
    fn record(&self, event: AuditEvent);
}

/// Bounded in-memory audit sink for testing and dev.
///
/// Clones share the same buffer, so a test can keep one handle and give the
/// other to the scheduler.
#[derive(Clone)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<VecDeque<AuditEvent>>>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a new in-memory sink keeping at most `max_events` events.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::with_capacity(max_events.min(1024)))),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Events recorded for a single task, oldest first.
    #[must_use]
    pub fn events_for(&self, task_id: TaskId) -> Vec<AuditEvent> {
        self.events
            .lock()
            .iter()
            .filter(|event| event.task_id == task_id)
            .cloned()
            .collect()
    }

    /// Actions recorded for a single task, oldest first.
    #[must_use]
    pub fn actions_for(&self, task_id: TaskId) -> Vec<AuditAction> {
        self.events_for(task_id).into_iter().map(|e| e.action).collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event);
    }
}

/// Sink forwarding every event to `tracing` at `info` level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        tracing::info!(
            task_id = event.task_id,
            action = %event.action,
            label = event.label.as_deref().unwrap_or("-"),
            detail = event.detail.as_deref().unwrap_or("-"),
            "task lifecycle"
        );
    }
}

/// Helper to build an audit event stamped with the current time.
pub fn build_audit_event(
    task_id: TaskId,
    action: AuditAction,
    label: Option<&str>,
    detail: Option<String>,
) -> AuditEvent {
    AuditEvent {
        task_id,
        action,
        label: label.map(str::to_owned),
        created_at_ms: now_ms(),
        detail,
    }
}
