//! Priority scheduling core.
//!
//! - [`PriorityQueue`]: unsynchronised binary max-heap of jobs
//! - [`JobQueue`]: monitor around the heap that consumers block on
//! - [`DeadLetterQueue`]: jobs that failed after all retries

pub mod dead_letter;
pub mod heap;
pub mod job;
pub mod queue;

pub use dead_letter::{DeadLetter, DeadLetterQueue};
pub use heap::PriorityQueue;
pub use job::{Job, JobFailure};
pub use queue::JobQueue;
