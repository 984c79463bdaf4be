//! Scheduler configuration.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable prefix read by [`SchedulerConfig::from_env`].
pub const ENV_PREFIX: &str = "DEFERRED_";

/// Default floor for the detected concurrency.
pub const DEFAULT_MIN_CONCURRENCY: usize = 2;

/// Default worker thread name prefix.
pub const DEFAULT_THREAD_NAME_PREFIX: &str = "deferred-worker";

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum concurrent workers. `None` derives it from the hardware.
    pub max_concurrency: Option<usize>,
    /// Floor applied to the hardware-derived concurrency.
    pub min_concurrency: usize,
    /// Maximum queued tasks before `submit` is refused. `None` is unbounded.
    pub max_queue_depth: Option<usize>,
    /// Queue timeout applied to tasks without their own, in milliseconds.
    pub default_queue_timeout_ms: Option<u64>,
    /// Prefix for worker and admission thread names.
    pub thread_name_prefix: String,
    /// Stack size for worker threads, in bytes. `None` uses the platform
    /// default.
    pub thread_stack_size: Option<usize>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: None,
            min_concurrency: DEFAULT_MIN_CONCURRENCY,
            max_queue_depth: None,
            default_queue_timeout_ms: None,
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_owned(),
            thread_stack_size: None,
        }
    }
}

impl SchedulerConfig {
    /// Configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fix the number of concurrent workers.
    #[must_use]
    pub const fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = Some(max);
        self
    }

    /// Floor for the hardware-derived concurrency.
    #[must_use]
    pub const fn with_min_concurrency(mut self, min: usize) -> Self {
        self.min_concurrency = min;
        self
    }

    /// Bound the queue.
    #[must_use]
    pub const fn with_max_queue_depth(mut self, depth: usize) -> Self {
        self.max_queue_depth = Some(depth);
        self
    }

    /// Expire queued tasks after `timeout` unless they set their own.
    #[must_use]
    pub fn with_default_queue_timeout(mut self, timeout: Duration) -> Self {
        self.default_queue_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Prefix for thread names.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Worker thread stack size in bytes.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = Some(bytes);
        self
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrency == Some(0) {
            return Err("max_concurrency must be greater than 0".into());
        }
        if self.min_concurrency == 0 {
            return Err("min_concurrency must be greater than 0".into());
        }
        if self.max_queue_depth == Some(0) {
            return Err("max_queue_depth must be greater than 0".into());
        }
        if self.default_queue_timeout_ms == Some(0) {
            return Err("default_queue_timeout_ms must be greater than 0".into());
        }
        if self.thread_name_prefix.is_empty() {
            return Err("thread_name_prefix must not be empty".into());
        }
        if self.thread_stack_size == Some(0) {
            return Err("thread_stack_size must be greater than 0".into());
        }
        Ok(())
    }

    /// Effective worker limit: the configured value, or the available
    /// hardware parallelism minus one (kept for the caller and the admission
    /// loop), never below `min_concurrency`.
    #[must_use]
    pub fn resolved_max_concurrency(&self) -> usize {
        self.max_concurrency.unwrap_or_else(|| {
            num_cpus::get()
                .saturating_sub(1)
                .max(self.min_concurrency)
        })
    }

    /// Default queue timeout as a `Duration`.
    #[must_use]
    pub fn default_queue_timeout(&self) -> Option<Duration> {
        self.default_queue_timeout_ms.map(Duration::from_millis)
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from `DEFERRED_*` environment variables, loading a
    /// `.env` file first if one exists. Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup using the same
    /// variable names as [`from_env`](Self::from_env).
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(v) = parse_var(&lookup, "MAX_CONCURRENCY")? {
            cfg.max_concurrency = Some(v);
        }
        if let Some(v) = parse_var(&lookup, "MIN_CONCURRENCY")? {
            cfg.min_concurrency = v;
        }
        if let Some(v) = parse_var(&lookup, "MAX_QUEUE_DEPTH")? {
            cfg.max_queue_depth = Some(v);
        }
        if let Some(v) = parse_var(&lookup, "QUEUE_TIMEOUT_MS")? {
            cfg.default_queue_timeout_ms = Some(v);
        }
        if let Some(v) = lookup(&format!("{ENV_PREFIX}THREAD_NAME_PREFIX")) {
            cfg.thread_name_prefix = v;
        }
        if let Some(v) = parse_var(&lookup, "THREAD_STACK_SIZE")? {
            cfg.thread_stack_size = Some(v);
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn parse_var<F, T>(lookup: &F, name: &str) -> Result<Option<T>, String>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let key = format!("{ENV_PREFIX}{name}");
    lookup(&key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| format!("{key}: invalid value `{raw}`: {e}"))
        })
        .transpose()
}
