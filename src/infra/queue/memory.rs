//! In-memory queue with priority and deadline awareness.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

use crate::core::{QueuedTask, SchedulerError, TaskQueue};

/// Heap entry ordered by priority (highest first), then FIFO within a
/// priority via the insertion sequence number.
struct PriorityTask {
    seq: u64,
    entry: QueuedTask,
}

impl PartialEq for PriorityTask {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for PriorityTask {}

impl PartialOrd for PriorityTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PriorityTask {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first
        match self.entry.priority.cmp(&other.entry.priority) {
            // Lower sequence wins (reversed for max-heap)
            Ordering::Equal => other.seq.cmp(&self.seq),
            other => other,
        }
    }
}

/// In-memory queue storing tasks in a binary heap.
/// O(log n) push and pop.
pub struct InMemoryQueue {
    max_depth: Option<usize>,
    next_seq: u64,
    tasks: BinaryHeap<PriorityTask>,
}

impl InMemoryQueue {
    /// Create an unbounded queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_depth: None,
            next_seq: 0,
            tasks: BinaryHeap::new(),
        }
    }

    /// Create a queue that rejects pushes beyond `max_depth` entries.
    #[must_use]
    pub fn bounded(max_depth: usize) -> Self {
        Self {
            max_depth: Some(max_depth),
            next_seq: 0,
            tasks: BinaryHeap::with_capacity(max_depth.min(1024)),
        }
    }
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskQueue for InMemoryQueue {
    fn push(&mut self, entry: QueuedTask) -> Result<(), SchedulerError> {
        if let Some(max) = self.max_depth {
            if self.tasks.len() >= max {
                return Err(SchedulerError::QueueFull(max));
            }
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.tasks.push(PriorityTask { seq, entry });
        Ok(())
    }

    fn pop(&mut self) -> Option<QueuedTask> {
        self.tasks.pop().map(|pt| pt.entry)
    }

    fn drain(&mut self) -> Vec<QueuedTask> {
        let mut sorted = std::mem::take(&mut self.tasks).into_sorted_vec();
        sorted.reverse();
        sorted.into_iter().map(|pt| pt.entry).collect()
    }

    fn prune_expired(&mut self, now: Instant) -> Vec<QueuedTask> {
        // Rebuild heap without expired tasks
        let (expired, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.tasks)
            .into_vec()
            .into_iter()
            .partition(|pt| pt.entry.is_expired(now));
        self.tasks = kept.into_iter().collect();
        expired.into_iter().map(|pt| pt.entry).collect()
    }

    fn max_depth(&self) -> Option<usize> {
        self.max_depth
    }

    fn len(&self) -> usize {
        self.tasks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DeferredTask, TaskId};
    use std::time::Duration;

    fn make_entry(priority: i32) -> QueuedTask {
        let task = DeferredTask::new(|| Ok(())).with_priority(priority).into_shared();
        QueuedTask::new(task, None)
    }

    fn pop_id(q: &mut InMemoryQueue) -> TaskId {
        q.pop().unwrap().id()
    }

    #[test]
    fn test_priority_ordering() {
        let mut q = InMemoryQueue::new();
        let low = make_entry(10);
        let high = make_entry(90);
        let mid = make_entry(50);
        let (low_id, high_id, mid_id) = (low.id(), high.id(), mid.id());

        q.push(low).unwrap();
        q.push(high).unwrap();
        q.push(mid).unwrap();

        assert_eq!(pop_id(&mut q), high_id);
        assert_eq!(pop_id(&mut q), mid_id);
        assert_eq!(pop_id(&mut q), low_id);
        assert!(q.pop().is_none());
    }

    #[test]
    fn test_fifo_within_priority() {
        let mut q = InMemoryQueue::new();
        let entries: Vec<_> = (0..5).map(|_| make_entry(40)).collect();
        let ids: Vec<_> = entries.iter().map(QueuedTask::id).collect();
        for entry in entries {
            q.push(entry).unwrap();
        }

        let popped: Vec<_> = std::iter::from_fn(|| q.pop().map(|e| e.id())).collect();
        assert_eq!(popped, ids);
    }

    #[test]
    fn test_queue_full() {
        let mut q = InMemoryQueue::bounded(2);
        q.push(make_entry(1)).unwrap();
        q.push(make_entry(2)).unwrap();

        let result = q.push(make_entry(3));
        assert!(matches!(result, Err(SchedulerError::QueueFull(2))));
        assert_eq!(q.len(), 2);
        assert_eq!(q.max_depth(), Some(2));
    }

    #[test]
    fn test_drain_highest_first() {
        let mut q = InMemoryQueue::new();
        for priority in [5, 70, 30] {
            q.push(make_entry(priority)).unwrap();
        }

        let drained: Vec<_> = q.drain().iter().map(|e| e.priority.value()).collect();
        assert_eq!(drained, vec![70, 30, 5]);
        assert!(q.is_empty());
    }

    #[test]
    fn test_prune_expired() {
        let mut q = InMemoryQueue::new();
        let now = Instant::now();

        let keep = make_entry(10);
        let mut expired = make_entry(99);
        expired.deadline = Some(now);
        let mut future = make_entry(20);
        future.deadline = Some(now + Duration::from_secs(60));
        let (keep_id, expired_id, future_id) = (keep.id(), expired.id(), future.id());

        q.push(keep).unwrap();
        q.push(expired).unwrap();
        q.push(future).unwrap();

        let pruned = q.prune_expired(now);
        assert_eq!(pruned.len(), 1);
        assert_eq!(pruned[0].id(), expired_id);
        assert_eq!(q.len(), 2);
        assert_eq!(pop_id(&mut q), future_id);
        assert_eq!(pop_id(&mut q), keep_id);
    }

    #[test]
    fn test_empty_queue() {
        let mut q = InMemoryQueue::default();
        assert!(q.pop().is_none());
        assert!(q.is_empty());
        assert!(q.drain().is_empty());
    }
}
