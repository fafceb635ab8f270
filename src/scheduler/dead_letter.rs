use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::scheduler::job::Job;

/// A job that kept failing after all of its retries.
#[derive(Debug, Clone, Serialize)]
pub struct DeadLetter {
    pub job: Job,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

/// Jobs that exhausted their retries, kept in memory for inspection.
#[derive(Debug, Default)]
pub struct DeadLetterQueue {
    entries: Mutex<Vec<DeadLetter>>,
}

impl DeadLetterQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, job: Job, reason: impl Into<String>) {
        self.lock().push(DeadLetter {
            job,
            reason: reason.into(),
            failed_at: Utc::now(),
        });
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of the current entries, oldest first.
    pub fn snapshot(&self) -> Vec<DeadLetter> {
        self.lock().clone()
    }

    /// Take all entries, leaving the queue empty.
    pub fn drain(&self) -> Vec<DeadLetter> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<DeadLetter>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
