use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::{BackoffStrategy, PoolConfig};
use crate::error::{ExecutionError, Result, SchedulerError};
use crate::scheduler::{DeadLetterQueue, Job, JobQueue};
use crate::worker::executor::JobExecutor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WorkerState {
    /// Waiting for a job
    Idle,
    /// Running a job
    Executing,
    /// Loop exited after pool shutdown
    Stopped,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerState::Idle,
            1 => WorkerState::Executing,
            _ => WorkerState::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            WorkerState::Idle => 0,
            WorkerState::Executing => 1,
            WorkerState::Stopped => 2,
        }
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::Idle => write!(f, "idle"),
            WorkerState::Executing => write!(f, "executing"),
            WorkerState::Stopped => write!(f, "stopped"),
        }
    }
}

#[derive(Debug, Clone)]
struct StateCell(Arc<AtomicU8>);

impl StateCell {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(WorkerState::Idle.as_u8())))
    }

    fn get(&self) -> WorkerState {
        WorkerState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: WorkerState) {
        self.0.store(state.as_u8(), Ordering::Release);
    }
}

/// Job outcome counters shared by all workers of a pool.
#[derive(Debug, Default)]
pub struct PoolStats {
    completed: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub completed: u64,
    /// Jobs moved to the dead-letter queue
    pub failed: u64,
    pub retried: u64,
}

impl PoolStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
        }
    }
}

/// What workers do with a job whose execution failed.
#[derive(Debug, Clone, Copy)]
struct RetryPolicy {
    max_retries: u32,
    backoff: Duration,
    strategy: BackoffStrategy,
}

impl RetryPolicy {
    fn none() -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::ZERO,
            strategy: BackoffStrategy::Fixed,
        }
    }

    fn from_config(config: &PoolConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff: config.retry_backoff,
            strategy: config.backoff_strategy,
        }
    }

    fn delay(&self, retry: u32) -> Duration {
        self.strategy.delay(self.backoff, retry)
    }
}

/// State shared between the workers of one pool.
#[derive(Debug)]
struct Shared {
    policy: RetryPolicy,
    stats: Arc<PoolStats>,
    dead_letters: Arc<DeadLetterQueue>,
    /// Jobs sitting out their retry backoff
    backoffs: TaskTracker,
}

impl Shared {
    fn new(policy: RetryPolicy, dead_letters: Arc<DeadLetterQueue>) -> Self {
        Self {
            policy,
            stats: Arc::new(PoolStats::default()),
            dead_letters,
            backoffs: TaskTracker::new(),
        }
    }
}

/// A consumer bound to one shared [`JobQueue`].
pub struct Worker {
    id: String,
    queue: Arc<JobQueue>,
    executor: Arc<dyn JobExecutor>,
    shared: Arc<Shared>,
    state: StateCell,
}

impl Worker {
    /// Create a standalone worker that does not retry.
    ///
    /// A failed job goes straight to the worker's own dead-letter queue, see
    /// [`dead_letters`](Self::dead_letters).
    pub fn new(
        id: impl Into<String>,
        queue: Arc<JobQueue>,
        executor: Arc<dyn JobExecutor>,
    ) -> Self {
        let shared = Shared::new(RetryPolicy::none(), Arc::new(DeadLetterQueue::new()));
        Self::with_shared(id.into(), queue, executor, Arc::new(shared))
    }

    /// Create a standalone worker that retries per `config` and dead-letters
    /// into `dead_letters`. Several workers may share one dead-letter queue.
    pub fn with_config(
        id: impl Into<String>,
        queue: Arc<JobQueue>,
        executor: Arc<dyn JobExecutor>,
        config: &PoolConfig,
        dead_letters: Arc<DeadLetterQueue>,
    ) -> Self {
        let shared = Shared::new(RetryPolicy::from_config(config), dead_letters);
        Self::with_shared(id.into(), queue, executor, Arc::new(shared))
    }

    fn with_shared(
        id: String,
        queue: Arc<JobQueue>,
        executor: Arc<dyn JobExecutor>,
        shared: Arc<Shared>,
    ) -> Self {
        Self {
            id,
            queue,
            executor,
            shared,
            state: StateCell::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> WorkerState {
        self.state.get()
    }

    /// Handle to the queue this worker dead-letters into. It stays valid
    /// after [`start`](Self::start).
    pub fn dead_letters(&self) -> Arc<DeadLetterQueue> {
        self.shared.dead_letters.clone()
    }

    /// Handle to this worker's outcome counters. It stays valid after
    /// [`start`](Self::start).
    pub fn stats(&self) -> Arc<PoolStats> {
        self.shared.stats.clone()
    }

    /// Spawn the consumption loop on the current Tokio runtime.
    ///
    /// The loop runs until `token` is cancelled; a job that is executing at
    /// that moment runs to completion first. Cancelling `token` also cuts
    /// short any retry backoff and puts the job back on the queue.
    pub fn start(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(token))
    }

    async fn run(self, token: CancellationToken) {
        tracing::info!(worker_id = %self.id, "Worker started");

        while let Some(job) = self.queue.get_job_or_cancel(&token).await {
            self.state.set(WorkerState::Executing);
            self.process(job, &token).await;
            self.state.set(WorkerState::Idle);
        }

        self.state.set(WorkerState::Stopped);
        tracing::info!(worker_id = %self.id, "Worker stopped");
    }

    async fn process(&self, job: Job, token: &CancellationToken) {
        tracing::debug!(
            worker_id = %self.id,
            job_id = %job.id,
            priority = job.priority,
            "Processing job"
        );

        match self.executor.execute(&job).await {
            Ok(()) => {
                self.shared.stats.completed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(worker_id = %self.id, job_id = %job.id, "Job completed");
            }
            Err(e) => self.handle_failure(job, e, token),
        }
    }

    fn handle_failure(&self, mut job: Job, error: ExecutionError, token: &CancellationToken) {
        let policy = self.shared.policy;
        job.record_failure(error.to_string());

        if job.attempts >= policy.max_retries {
            self.shared.stats.failed.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                worker_id = %self.id,
                job_id = %job.id,
                attempts = job.attempts + 1,
                error = %error,
                "Job failed permanently, moving to dead-letter queue"
            );
            self.shared.dead_letters.push(job, error.to_string());
            return;
        }

        job.attempts += 1;
        let delay = policy.delay(job.attempts);
        self.shared.stats.retried.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            worker_id = %self.id,
            job_id = %job.id,
            attempts = job.attempts,
            backoff = ?delay,
            error = %error,
            "Job failed, scheduling retry"
        );

        if delay.is_zero() {
            self.queue.add_job(job);
            return;
        }

        // The backoff runs off the worker so it can take the next job.
        let queue = self.queue.clone();
        let token = token.clone();
        self.shared.backoffs.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = token.cancelled() => {
                    tracing::debug!(job_id = %job.id, "Backoff cut short by shutdown");
                }
            }
            queue.add_job(job);
        });
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("state", &self.state.get())
            .finish_non_exhaustive()
    }
}

/// Fixed-size set of workers consuming one [`JobQueue`].
pub struct WorkerPool {
    queue: Arc<JobQueue>,
    shared: Arc<Shared>,
    workers: Vec<(String, StateCell)>,
    handles: Vec<JoinHandle<()>>,
    token: CancellationToken,
}

impl WorkerPool {
    /// Validate `config` and start `config.worker_count` workers.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        config: PoolConfig,
        queue: Arc<JobQueue>,
        executor: Arc<dyn JobExecutor>,
    ) -> Result<Self> {
        Self::start_with_token(config, queue, executor, &CancellationToken::new())
    }

    /// Like [`start`](Self::start), but the pool also stops when `parent` is
    /// cancelled.
    pub fn start_with_token(
        config: PoolConfig,
        queue: Arc<JobQueue>,
        executor: Arc<dyn JobExecutor>,
        parent: &CancellationToken,
    ) -> Result<Self> {
        config.validate()?;

        let token = parent.child_token();
        let shared = Arc::new(Shared::new(
            RetryPolicy::from_config(&config),
            Arc::new(DeadLetterQueue::new()),
        ));
        let mut workers = Vec::with_capacity(config.worker_count);
        let mut handles = Vec::with_capacity(config.worker_count);

        for n in 1..=config.worker_count {
            let worker = Worker::with_shared(
                config.worker_name(n),
                queue.clone(),
                executor.clone(),
                shared.clone(),
            );
            workers.push((worker.id.clone(), worker.state.clone()));
            handles.push(worker.start(token.clone()));
        }

        tracing::info!(
            workers = config.worker_count,
            max_retries = config.max_retries,
            backoff_strategy = ?config.backoff_strategy,
            "Worker pool started"
        );

        Ok(Self {
            queue,
            shared,
            workers,
            handles,
            token,
        })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    pub fn dead_letters(&self) -> &DeadLetterQueue {
        &self.shared.dead_letters
    }

    /// Current state of every worker, in start order.
    pub fn states(&self) -> Vec<(String, WorkerState)> {
        self.workers
            .iter()
            .map(|(id, state)| (id.clone(), state.get()))
            .collect()
    }

    /// Stop all workers and wait for them to exit.
    ///
    /// Jobs still queued stay in the queue, and jobs waiting out a retry
    /// backoff are put back on it; stats and dead letters remain readable
    /// afterwards. Returns the first worker that panicked, after
    /// every worker has been joined. Calling it again is a no-op.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.token.cancel();

        let mut first_error: Option<SchedulerError> = None;
        for handle in std::mem::take(&mut self.handles) {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Worker task ended abnormally");
                first_error.get_or_insert(SchedulerError::WorkerJoin(e));
            }
        }

        // Workers are gone, so no new backoff can start.
        self.shared.backoffs.close();
        self.shared.backoffs.wait().await;

        tracing::info!(
            remaining_jobs = self.queue.len(),
            dead_letters = self.shared.dead_letters.len(),
            "Worker pool stopped"
        );

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.states())
            .field("queued", &self.queue.len())
            .finish_non_exhaustive()
    }
}
