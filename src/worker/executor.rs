use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use crate::error::ExecutionError;
use crate::scheduler::Job;

/// The work a worker performs for each dequeued job.
///
/// Implemented for any `Fn(Job) -> impl Future<Output = Result<(), ExecutionError>>`,
/// so tests and small programs can pass a closure.
#[async_trait]
pub trait JobExecutor: Send + Sync + 'static {
    async fn execute(&self, job: &Job) -> Result<(), ExecutionError>;
}

#[async_trait]
impl<F, Fut> JobExecutor for F
where
    F: Fn(Job) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ExecutionError>> + Send + 'static,
{
    async fn execute(&self, job: &Job) -> Result<(), ExecutionError> {
        (self)(job.clone()).await
    }
}

/// Stand-in for real work: sleeps for a fixed delay and fails at random.
#[derive(Debug, Clone)]
pub struct SimulatedExecutor {
    delay: Duration,
    failure_rate: f64,
}

impl SimulatedExecutor {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            failure_rate: 0.0,
        }
    }

    /// Probability in `[0, 1]` that a run fails; values outside are clamped.
    pub fn with_failure_rate(mut self, failure_rate: f64) -> Self {
        self.failure_rate = if failure_rate.is_nan() {
            0.0
        } else {
            failure_rate.clamp(0.0, 1.0)
        };
        self
    }
}

#[async_trait]
impl JobExecutor for SimulatedExecutor {
    async fn execute(&self, job: &Job) -> Result<(), ExecutionError> {
        tracing::info!(
            job_id = %job.id,
            priority = job.priority,
            delay = ?self.delay,
            "Executing job"
        );
        tokio::time::sleep(self.delay).await;

        let failed = rand::thread_rng().gen_bool(self.failure_rate);
        if failed {
            return Err(ExecutionError::Failed(format!(
                "simulated failure for job {}",
                job.id
            )));
        }
        Ok(())
    }
}

/// Wraps another executor and fails runs that take longer than `limit`.
#[derive(Debug, Clone)]
pub struct TimeoutExecutor<E> {
    inner: E,
    limit: Duration,
}

impl<E: JobExecutor> TimeoutExecutor<E> {
    pub fn new(inner: E, limit: Duration) -> Self {
        Self { inner, limit }
    }
}

#[async_trait]
impl<E: JobExecutor> JobExecutor for TimeoutExecutor<E> {
    async fn execute(&self, job: &Job) -> Result<(), ExecutionError> {
        match tokio::time::timeout(self.limit, self.inner.execute(job)).await {
            Ok(result) => result,
            Err(_) => Err(ExecutionError::Timeout(self.limit)),
        }
    }
}
