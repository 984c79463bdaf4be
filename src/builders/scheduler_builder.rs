//! Fluent builder for [`Scheduler`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::SchedulerConfig;
use crate::core::{AuditSink, Scheduler, SchedulerError, TaskQueue};
use crate::infra::queue::InMemoryQueue;

/// Builder collecting configuration and collaborators for a scheduler.
#[derive(Default)]
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    audit: Option<Arc<dyn AuditSink>>,
}

impl SchedulerBuilder {
    /// Builder with default configuration and no audit sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration.
    #[must_use]
    pub fn from_config(config: SchedulerConfig) -> Self {
        Self {
            config,
            audit: None,
        }
    }

    /// Fix the number of concurrent workers.
    #[must_use]
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.config = self.config.with_max_concurrency(max);
        self
    }

    /// Bound the in-memory queue.
    #[must_use]
    pub fn with_max_queue_depth(mut self, depth: usize) -> Self {
        self.config = self.config.with_max_queue_depth(depth);
        self
    }

    /// Queue timeout for tasks that do not set their own.
    #[must_use]
    pub fn with_default_queue_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_default_queue_timeout(timeout);
        self
    }

    /// Prefix for worker thread names.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config = self.config.with_thread_name_prefix(prefix);
        self
    }

    /// Report lifecycle events to `sink`.
    #[must_use]
    pub fn with_audit(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Configuration collected so far.
    #[must_use]
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Build a scheduler over an [`InMemoryQueue`] sized by the
    /// configuration.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::InvalidConfig`] if the configuration is invalid.
    pub fn build(self) -> Result<Scheduler<InMemoryQueue>, SchedulerError> {
        let queue = self
            .config
            .max_queue_depth
            .map_or_else(InMemoryQueue::new, InMemoryQueue::bounded);
        Scheduler::with_queue(self.config, queue, self.audit)
    }

    /// Build a scheduler over a custom queue backend.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::InvalidConfig`] if the configuration is invalid.
    pub fn build_with_queue<Q: TaskQueue>(self, queue: Q) -> Result<Scheduler<Q>, SchedulerError> {
        Scheduler::with_queue(self.config, queue, self.audit)
    }
}

impl fmt::Debug for SchedulerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerBuilder")
            .field("config", &self.config)
            .field("audit", &self.audit.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::InMemoryAuditSink;

    #[test]
    fn test_builder_collects_config() {
        let builder = SchedulerBuilder::new()
            .with_max_concurrency(3)
            .with_max_queue_depth(10)
            .with_default_queue_timeout(Duration::from_millis(250))
            .with_thread_name_prefix("jobs");
        let config = builder.config();
        assert_eq!(config.max_concurrency, Some(3));
        assert_eq!(config.max_queue_depth, Some(10));
        assert_eq!(config.default_queue_timeout_ms, Some(250));
        assert_eq!(config.thread_name_prefix, "jobs");
    }

    #[test]
    fn test_build_applies_limits() {
        let scheduler = SchedulerBuilder::new()
            .with_max_concurrency(3)
            .with_audit(Arc::new(InMemoryAuditSink::new(16)))
            .build()
            .unwrap();
        assert_eq!(scheduler.max_concurrency(), 3);
        assert!(!scheduler.is_running());
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let err = SchedulerBuilder::new().with_max_concurrency(0).build().unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidConfig(_)));
    }
}
