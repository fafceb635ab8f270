//! Job consumers.
//!
//! - [`Worker`]: loops block-dequeue → execute → repeat on a shared
//!   [`JobQueue`](crate::scheduler::JobQueue)
//! - [`WorkerPool`]: a fixed number of workers with a joint shutdown
//! - [`JobExecutor`]: the work performed per job, injected by the caller
//!
//! # Failure handling
//!
//! A job whose execution returns an error is re-enqueued with its original
//! priority and timestamp until it has failed `max_retries + 1` times, then
//! it lands in the pool's [`DeadLetterQueue`](crate::scheduler::DeadLetterQueue).
//! Each failure is appended to [`Job::failures`](crate::scheduler::Job::failures).
//!
//! Retries wait out a fixed or exponential backoff in a task the pool tracks.
//! Shutdown cuts the backoff short and puts the job back on the queue, so
//! after [`WorkerPool::shutdown`] every job is queued, completed or
//! dead-lettered.

pub mod executor;
pub mod pool;

pub use executor::{JobExecutor, SimulatedExecutor, TimeoutExecutor};
pub use pool::{PoolStats, StatsSnapshot, Worker, WorkerPool, WorkerState};
