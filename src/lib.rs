pub mod config;
pub mod error;
pub mod scheduler;
pub mod shutdown;
pub mod worker;

pub use config::{BackoffStrategy, PoolConfig};
pub use error::{ExecutionError, Result, SchedulerError};
pub use scheduler::{DeadLetter, DeadLetterQueue, Job, JobFailure, JobQueue, PriorityQueue};
pub use worker::{JobExecutor, Worker, WorkerPool, WorkerState};
