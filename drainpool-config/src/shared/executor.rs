use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// How an executor treats tasks that are still pending when shutdown begins.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelMode {
    /// Queued tasks are drained and in-flight tasks run to completion.
    #[default]
    Graceful,
    /// Workers stop claiming tasks, in-flight tasks observe their cancellation
    /// token, and queued tasks are discarded.
    Hard,
}

/// Sizing and shutdown behavior of a bounded executor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ExecutorConfig {
    /// Number of workers spawned at start. Fixed for the executor lifetime.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Maximum number of tasks waiting in the queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Drain timeout, in milliseconds, used when shutting down from a signal.
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
    /// Behavior applied to pending work on shutdown.
    #[serde(default)]
    pub cancel_mode: CancelMode,
}

impl ExecutorConfig {
    /// Default number of workers.
    pub const DEFAULT_WORKER_COUNT: usize = 4;

    /// Default queue capacity.
    pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

    /// Default drain timeout in milliseconds.
    pub const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 30_000;

    /// Creates a graceful configuration with the given sizes.
    pub fn new(worker_count: usize, queue_capacity: usize) -> Self {
        Self {
            worker_count,
            queue_capacity,
            ..Default::default()
        }
    }

    /// Returns the drain timeout as a [`Duration`].
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// Ensures both sizes are non-zero.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.worker_count == 0 {
            return Err(ValidationError::invalid(
                "executor.worker_count",
                "must be greater than 0",
            ));
        }

        if self.queue_capacity == 0 {
            return Err(ValidationError::invalid(
                "executor.queue_capacity",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            queue_capacity: default_queue_capacity(),
            drain_timeout_ms: default_drain_timeout_ms(),
            cancel_mode: CancelMode::default(),
        }
    }
}

fn default_worker_count() -> usize {
    ExecutorConfig::DEFAULT_WORKER_COUNT
}

fn default_queue_capacity() -> usize {
    ExecutorConfig::DEFAULT_QUEUE_CAPACITY
}

fn default_drain_timeout_ms() -> u64 {
    ExecutorConfig::DEFAULT_DRAIN_TIMEOUT_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ExecutorConfig::default();
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.queue_capacity, 64);
        assert_eq!(config.cancel_mode, CancelMode::Graceful);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_workers_is_rejected() {
        let err = ExecutorConfig::new(0, 10).validate().unwrap_err();
        assert!(err.to_string().contains("executor.worker_count"));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = ExecutorConfig::new(1, 0).validate().unwrap_err();
        assert!(err.to_string().contains("executor.queue_capacity"));
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: ExecutorConfig =
            serde_json::from_str(r#"{"worker_count": 2, "cancel_mode": "hard"}"#).unwrap();
        assert_eq!(config.worker_count, 2);
        assert_eq!(config.queue_capacity, ExecutorConfig::DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.cancel_mode, CancelMode::Hard);
        assert_eq!(config.drain_timeout(), Duration::from_secs(30));
    }
}
