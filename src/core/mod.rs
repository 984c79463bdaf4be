//! Core scheduling abstractions: tasks, statuses, the queue contract and the
//! scheduler itself.

pub mod audit;
pub mod error;
pub mod queue;
pub mod registry;
pub mod scheduler;
pub mod stats;
pub mod status;
pub mod task;
mod worker;

pub use audit::{
    build_audit_event, AuditAction, AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink,
};
pub use error::{AppResult, SchedulerError, TaskError, TaskResult};
pub use queue::{QueuedTask, TaskQueue};
pub use registry::{Claim, StatusRegistry};
pub use scheduler::Scheduler;
pub use stats::SchedulerStats;
pub use status::TaskStatus;
#[cfg(feature = "tokio-runtime")]
pub use task::AsyncJob;
pub use task::{DeferredTask, Job, Priority, SharedTask, TaskId};
