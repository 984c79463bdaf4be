//! Task lifecycle status and its state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Status of a task in the scheduler lifecycle.
///
/// ```text
/// InQueue ──> Processing ──> Done | Failed
///    │
///    ├──> Cancelled
///    ├──> Discarded
///    └──> Expired
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task is queued and waits for a free worker slot.
    InQueue,
    /// A worker claimed the task and is running its payload.
    Processing,
    /// Task was cancelled while still queued.
    Cancelled,
    /// Payload finished successfully.
    Done,
    /// Payload returned an error or panicked.
    Failed(String),
    /// Task was still queued when the scheduler released all tasks.
    Discarded,
    /// Task waited in the queue longer than its queue timeout.
    Expired,
}

impl TaskStatus {
    /// Whether no further transition can occur from this status.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::InQueue | Self::Processing)
    }

    /// Whether the state machine permits moving from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(&self, next: &Self) -> bool {
        match self {
            Self::InQueue => !matches!(next, Self::InQueue | Self::Done | Self::Failed(_)),
            Self::Processing => matches!(next, Self::Done | Self::Failed(_)),
            _ => false,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InQueue => f.write_str("in_queue"),
            Self::Processing => f.write_str("processing"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::Done => f.write_str("done"),
            Self::Failed(reason) => write!(f, "failed ({reason})"),
            Self::Discarded => f.write_str("discarded"),
            Self::Expired => f.write_str("expired"),
        }
    }
}
