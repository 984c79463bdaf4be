//! # Deferred Tasks
//!
//! A priority-ordered deferred task scheduler backed by OS threads.
//!
//! Callers submit units of work with a priority between 0 and 100. A single
//! admission loop hands the highest-priority queued task to a fresh worker
//! thread whenever fewer than `max_concurrency` workers are running. Every
//! task carries a status (`in_queue`, `processing`, `done`, `failed`,
//! `cancelled`, ...) that callers can query at any time by task id.
//!
//! ## Key Features
//!
//! - **Priority ordering**: higher priority first, submission order among
//!   equals
//! - **Bounded concurrency**: never more than `max_concurrency` payloads at
//!   once, derived from the hardware unless configured
//! - **No polling**: the loop sleeps on a channel, shutdown waits on a
//!   condition variable
//! - **Best-effort cancellation**: a task can be cancelled until a worker
//!   claims it
//! - **Queue timeouts**: tasks that wait too long become `expired`
//! - **Async payloads**: `async` jobs run on a private current-thread runtime
//!   (`tokio-runtime` feature)
//! - **Audit trail**: optional sink receiving every lifecycle event
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use deferred_tasks::builders::SchedulerBuilder;
//! use deferred_tasks::core::{DeferredTask, TaskStatus};
//!
//! let scheduler = SchedulerBuilder::new().with_max_concurrency(2).build()?;
//! scheduler.start()?;
//!
//! let low = scheduler.submit(DeferredTask::new(|| Ok(())).with_priority(10))?;
//! let high = scheduler.submit(DeferredTask::new(|| Ok(())).with_priority(90))?;
//!
//! scheduler.wait_idle(Duration::from_secs(1));
//! assert_eq!(scheduler.status(high)?, TaskStatus::Done);
//! assert_eq!(scheduler.status(low)?, TaskStatus::Done);
//!
//! // Drops whatever is still queued.
//! scheduler.release_all();
//! # Ok::<(), deferred_tasks::core::SchedulerError>(())
//! ```
//!
//! For complete scenarios, see `tests/scheduler_test.rs`.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions: tasks, statuses and the scheduler.
pub mod core;
/// Configuration models for the scheduler.
pub mod config;
/// Builders to construct schedulers from configuration.
pub mod builders;
/// Infrastructure adapters for queue backends.
pub mod infra;
/// Shared utilities.
pub mod util;
