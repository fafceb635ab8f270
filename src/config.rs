use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulerError};

/// How the retry delay grows with each failed attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// Every retry waits the base delay
    #[default]
    Fixed,
    /// Retry `n` waits `base * 2^(n-1)`
    Exponential,
}

impl BackoffStrategy {
    /// Delay before retry number `retry` (1 for the first retry).
    pub fn delay(&self, base: Duration, retry: u32) -> Duration {
        match self {
            BackoffStrategy::Fixed => base,
            BackoffStrategy::Exponential => {
                let factor = 1u32
                    .checked_shl(retry.saturating_sub(1))
                    .unwrap_or(u32::MAX);
                base.saturating_mul(factor)
            }
        }
    }
}

/// Configuration for a [`WorkerPool`](crate::worker::WorkerPool).
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of workers, fixed for the lifetime of the pool
    pub worker_count: usize,
    /// Workers are named `<prefix>-1` through `<prefix>-<worker_count>`
    pub worker_prefix: String,
    /// How many times a failing job is re-enqueued before it is dead-lettered
    pub max_retries: u32,
    /// Base delay before a failed job goes back on the queue
    pub retry_backoff: Duration,
    pub backoff_strategy: BackoffStrategy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_count: 5,
            worker_prefix: "worker".to_string(),
            max_retries: 3,
            retry_backoff: Duration::from_secs(2),
            backoff_strategy: BackoffStrategy::Fixed,
        }
    }
}

impl PoolConfig {
    pub fn new(worker_count: usize) -> Self {
        Self {
            worker_count,
            ..Default::default()
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.worker_prefix = prefix.into();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_backoff_strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff_strategy = strategy;
        self
    }

    /// Delay before retry number `retry` of a failed job.
    pub fn backoff_for(&self, retry: u32) -> Duration {
        self.backoff_strategy.delay(self.retry_backoff, retry)
    }

    /// Reject settings the pool cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(SchedulerError::InvalidConfig(
                "worker_count must be at least 1".to_string(),
            ));
        }
        if self.worker_prefix.trim().is_empty() {
            return Err(SchedulerError::InvalidConfig(
                "worker_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn worker_name(&self, n: usize) -> String {
        format!("{}-{}", self.worker_prefix, n)
    }
}
