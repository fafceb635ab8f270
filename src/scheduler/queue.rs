use std::pin::pin;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::scheduler::heap::PriorityQueue;
use crate::scheduler::job::Job;

/// Shared priority queue that workers block on.
///
/// A monitor around [`PriorityQueue`]: the heap is only touched while `heap`
/// is locked, and `available` wakes one waiting consumer per added job.
/// Share it between producers and workers with an `Arc`.
#[derive(Debug, Default)]
pub struct JobQueue {
    heap: Mutex<PriorityQueue>,
    available: Notify,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a job and wake one waiting consumer, if any.
    ///
    /// Never blocks beyond the short heap lock, so it can be called from sync
    /// and async producers alike.
    pub fn add_job(&self, job: Job) {
        tracing::debug!(job_id = %job.id, priority = job.priority, "Job enqueued");
        self.lock().insert(job);
        self.available.notify_one();
    }

    /// Wait for the highest-ranked job and remove it.
    ///
    /// Suspends for as long as the queue stays empty; there is no timeout.
    pub async fn get_job(&self) -> Job {
        loop {
            let mut notified = pin!(self.available.notified());
            // Register before checking so an add between the check and the
            // await still wakes us.
            notified.as_mut().enable();

            if let Some(job) = self.try_get_job() {
                return job;
            }

            // A wake-up only means a job was added at some point; another
            // consumer may already have taken it, so check again.
            notified.await;
        }
    }

    /// Like [`get_job`](Self::get_job), but gives up with `None` once
    /// `token` is cancelled.
    pub async fn get_job_or_cancel(&self, token: &CancellationToken) -> Option<Job> {
        tokio::select! {
            biased;
            _ = token.cancelled() => None,
            job = self.get_job() => Some(job),
        }
    }

    /// Remove the highest-ranked job without waiting.
    pub fn try_get_job(&self) -> Option<Job> {
        let job = self.lock().extract_max()?;
        tracing::debug!(job_id = %job.id, priority = job.priority, "Job dequeued");
        Some(job)
    }

    /// Number of queued jobs at the moment of the call.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // Heap operations never leave the heap half-updated across a panic
    // point, so a poisoned lock still guards a valid heap.
    fn lock(&self) -> MutexGuard<'_, PriorityQueue> {
        self.heap.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
