use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A unit of work waiting to be scheduled.
///
/// Jobs are ordered by `priority` (higher first) and then by `timestamp`
/// (earlier first). The `id` is opaque to the scheduler; keeping it unique is
/// up to the producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub priority: i64,
    pub timestamp: DateTime<Utc>,
    pub payload: Option<serde_json::Value>,
    /// Retries scheduled so far.
    pub attempts: u32,
    /// Every failed execution, oldest first.
    #[serde(default)]
    pub failures: Vec<JobFailure>,
}

/// One failed execution of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFailure {
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

impl Job {
    pub fn new(id: impl Into<String>, priority: i64) -> Self {
        Self::with_timestamp(id, priority, Utc::now())
    }

    pub fn with_timestamp(id: impl Into<String>, priority: i64, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            priority,
            timestamp,
            payload: None,
            attempts: 0,
            failures: Vec::new(),
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub(crate) fn record_failure(&mut self, reason: impl Into<String>) {
        self.failures.push(JobFailure {
            reason: reason.into(),
            failed_at: Utc::now(),
        });
    }

    /// Returns true if `self` must be served before `other`.
    ///
    /// Jobs with equal priority and equal timestamp precede neither way.
    pub fn precedes(&self, other: &Job) -> bool {
        if self.priority == other.priority {
            return self.timestamp < other.timestamp;
        }
        self.priority > other.priority
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn new_job_has_no_attempts_or_payload() {
        let job = Job::new("job1", 3);
        assert_eq!(job.id, "job1");
        assert_eq!(job.priority, 3);
        assert_eq!(job.attempts, 0);
        assert!(job.payload.is_none());
        assert!(job.failures.is_empty());
    }

    #[test]
    fn failures_accumulate_in_order() {
        let mut job = Job::new("job1", 1);
        job.record_failure("first");
        job.record_failure("second".to_string());
        let reasons: Vec<&str> = job.failures.iter().map(|f| f.reason.as_str()).collect();
        assert_eq!(reasons, vec!["first", "second"]);
        assert!(job.failures[0].failed_at <= job.failures[1].failed_at);
    }

    #[test]
    fn missing_failures_field_deserializes_empty() {
        let job: Job = serde_json::from_value(serde_json::json!({
            "id": "job1",
            "priority": 2,
            "timestamp": "2024-01-01T00:00:00Z",
            "payload": null,
            "attempts": 0
        }))
        .unwrap();
        assert!(job.failures.is_empty());
    }

    #[test]
    fn higher_priority_precedes() {
        let t0 = Utc::now();
        let low = Job::with_timestamp("low", 1, t0);
        let high = Job::with_timestamp("high", 2, t0 + Duration::seconds(5));
        assert!(high.precedes(&low));
        assert!(!low.precedes(&high));
    }

    #[test]
    fn earlier_timestamp_breaks_ties() {
        let t0 = Utc::now();
        let first = Job::with_timestamp("a", 1, t0);
        let second = Job::with_timestamp("b", 1, t0 + Duration::milliseconds(1));
        assert!(first.precedes(&second));
        assert!(!second.precedes(&first));
    }

    #[test]
    fn identical_keys_precede_neither_way() {
        let t0 = Utc::now();
        let a = Job::with_timestamp("a", 7, t0);
        let b = Job::with_timestamp("b", 7, t0);
        assert!(!a.precedes(&b));
        assert!(!b.precedes(&a));
    }

    #[test]
    fn payload_round_trips_through_json() {
        let job = Job::new("job1", 1).with_payload(serde_json::json!({"to": "a@b.c"}));
        let encoded = serde_json::to_string(&job).unwrap();
        let decoded: Job = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, job);
    }
}
