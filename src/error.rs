use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Worker task failed: {0}")]
    WorkerJoin(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Failure reported by a [`JobExecutor`](crate::worker::JobExecutor).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Job failed: {0}")]
    Failed(String),

    #[error("Job timed out after {0:?}")]
    Timeout(Duration),
}
