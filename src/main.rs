use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use rand::Rng;
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use heapq_runner::scheduler::{DeadLetter, Job, JobQueue};
use heapq_runner::shutdown::install_shutdown_handler;
use heapq_runner::worker::{SimulatedExecutor, StatsSnapshot, WorkerPool};
use heapq_runner::{BackoffStrategy, PoolConfig};

#[derive(Parser, Debug)]
#[command(name = "heapq-runner")]
#[command(version)]
#[command(about = "Run a priority job queue with a fixed pool of workers")]
struct Args {
    /// Number of workers in the pool
    #[arg(long, default_value = "5")]
    workers: usize,

    /// Number of demo jobs to submit
    #[arg(long, default_value = "3")]
    jobs: usize,

    /// Demo jobs get a random priority in 0..=max_priority
    #[arg(long, default_value = "10")]
    max_priority: i64,

    /// Simulated execution time per job in milliseconds
    #[arg(long, default_value = "2000")]
    exec_delay_ms: u64,

    /// Probability (0.0 - 1.0) that a simulated execution fails
    #[arg(long, default_value = "0.0")]
    failure_rate: f64,

    /// Retries per job before it is dead-lettered
    #[arg(long, default_value = "3")]
    max_retries: u32,

    /// Delay before a failed job is re-enqueued, in milliseconds
    #[arg(long, default_value = "2000")]
    retry_backoff_ms: u64,

    /// Keep the retry delay fixed or double it on every retry
    #[arg(long, default_value = "fixed")]
    backoff: BackoffArg,

    /// Stop after this many seconds (Ctrl-C stops earlier)
    #[arg(long, default_value = "10")]
    run_for_secs: u64,

    /// Output format for the final report
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Debug, Clone, ValueEnum)]
enum BackoffArg {
    Fixed,
    Exponential,
}

impl From<BackoffArg> for BackoffStrategy {
    fn from(arg: BackoffArg) -> Self {
        match arg {
            BackoffArg::Fixed => BackoffStrategy::Fixed,
            BackoffArg::Exponential => BackoffStrategy::Exponential,
        }
    }
}

#[derive(Serialize)]
struct RunReport {
    workers: usize,
    submitted: usize,
    remaining: usize,
    stats: StatsSnapshot,
    dead_letters: Vec<DeadLetter>,
}

fn demo_jobs(count: usize, max_priority: i64) -> Vec<Job> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|n| {
            let priority = rng.gen_range(0..=max_priority.max(0));
            Job::new(Uuid::new_v4().to_string(), priority)
                .with_payload(serde_json::json!({ "sequence": n + 1 }))
        })
        .collect()
}

fn print_report(
    report: &RunReport,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        OutputFormat::Table => {
            println!("Workers:      {}", report.workers);
            println!("Submitted:    {}", report.submitted);
            println!("Completed:    {}", report.stats.completed);
            println!("Retried:      {}", report.stats.retried);
            println!("Failed:       {}", report.stats.failed);
            println!("Still queued: {}", report.remaining);
            if !report.dead_letters.is_empty() {
                println!();
                println!("{:<38} {:>8} {:>8}  REASON", "JOB ID", "PRIORITY", "ATTEMPTS");
                for dl in &report.dead_letters {
                    println!(
                        "{:<38} {:>8} {:>8}  {}",
                        dl.job.id,
                        dl.job.priority,
                        dl.job.attempts + 1,
                        dl.reason
                    );
                }
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = PoolConfig::new(args.workers)
        .with_max_retries(args.max_retries)
        .with_retry_backoff(Duration::from_millis(args.retry_backoff_ms))
        .with_backoff_strategy(args.backoff.clone().into());
    let executor = SimulatedExecutor::new(Duration::from_millis(args.exec_delay_ms))
        .with_failure_rate(args.failure_rate);

    let shutdown = install_shutdown_handler();
    let queue = Arc::new(JobQueue::new());
    let mut pool =
        WorkerPool::start_with_token(config, queue.clone(), Arc::new(executor), &shutdown)?;

    let jobs = demo_jobs(args.jobs, args.max_priority);
    let submitted = jobs.len();
    for job in jobs {
        queue.add_job(job);
    }
    tracing::info!(submitted, "Demo jobs submitted");

    tokio::select! {
        _ = shutdown.cancelled() => {}
        _ = tokio::time::sleep(Duration::from_secs(args.run_for_secs)) => {
            tracing::info!(run_for_secs = args.run_for_secs, "Run time elapsed");
        }
    }

    pool.shutdown().await?;

    let report = RunReport {
        workers: pool.size(),
        submitted,
        remaining: queue.len(),
        stats: pool.stats(),
        dead_letters: pool.dead_letters().drain(),
    };
    print_report(&report, &args.output)
}
