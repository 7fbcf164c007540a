//! Bounded worker pool.
//!
//! All jobs are enqueued up front into a bounded queue. Exactly `w` workers
//! pull from it until it is drained; each worker runs its jobs strictly one
//! after another. Results and local I/O errors travel back on separate
//! channels and are collected once every worker has been joined.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::job::Job;
use crate::error::SchedulerError;
use crate::metrics::MetricsCollector;
use crate::runner::{JobContext, JobRunner, Outcome, TaskLog, TaskResult};

/// Per-job artifact file names.
pub const LOG_FILE_NAME: &str = "log.txt";
pub const RESULT_FILE_NAME: &str = "results.yaml";

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of workers. Zero is treated as one.
    pub num_workers: usize,
    /// Root of the per-job artifact directories.
    pub output_dir: PathBuf,
    /// Kubeconfig handed to jobs running against the shared cluster.
    pub shared_kubeconfig: PathBuf,
}

impl WorkerPoolConfig {
    pub fn new(num_workers: usize, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            num_workers,
            output_dir: output_dir.into(),
            shared_kubeconfig: PathBuf::new(),
        }
    }

    pub fn with_shared_kubeconfig(mut self, path: impl Into<PathBuf>) -> Self {
        self.shared_kubeconfig = path.into();
        self
    }

    pub fn worker_count(&self) -> usize {
        self.num_workers.max(1)
    }
}

/// Statistics about a pool run.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    pub num_workers: usize,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub jobs_errored: u64,
    pub average_job_duration: Duration,
}

impl PoolStats {
    pub fn total_processed(&self) -> u64 {
        self.jobs_succeeded + self.jobs_failed + self.jobs_errored
    }

    /// Success rate as a percentage.
    pub fn success_rate(&self) -> f64 {
        let total = self.total_processed();
        if total == 0 {
            return 0.0;
        }
        (self.jobs_succeeded as f64 / total as f64) * 100.0
    }
}

/// Shared state for tracking pool statistics.
struct SharedPoolStats {
    jobs_succeeded: AtomicU64,
    jobs_failed: AtomicU64,
    jobs_errored: AtomicU64,
    total_duration_ms: AtomicU64,
}

impl SharedPoolStats {
    fn new() -> Self {
        Self {
            jobs_succeeded: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
            jobs_errored: AtomicU64::new(0),
            total_duration_ms: AtomicU64::new(0),
        }
    }

    fn record(&self, outcome: Outcome, duration: Duration) {
        let counter = match outcome {
            Outcome::Success => &self.jobs_succeeded,
            Outcome::Fail => &self.jobs_failed,
            Outcome::Error => &self.jobs_errored,
        };
        counter.fetch_add(1, Ordering::SeqCst);
        self.total_duration_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    fn to_pool_stats(&self, num_workers: usize) -> PoolStats {
        let succeeded = self.jobs_succeeded.load(Ordering::SeqCst);
        let failed = self.jobs_failed.load(Ordering::SeqCst);
        let errored = self.jobs_errored.load(Ordering::SeqCst);
        let total_duration_ms = self.total_duration_ms.load(Ordering::SeqCst);

        let total_jobs = succeeded + failed + errored;
        let average_duration = if total_jobs > 0 {
            Duration::from_millis(total_duration_ms / total_jobs)
        } else {
            Duration::ZERO
        };

        PoolStats {
            num_workers,
            jobs_succeeded: succeeded,
            jobs_failed: failed,
            jobs_errored: errored,
            average_job_duration: average_duration,
        }
    }
}

/// Worker pool that fans jobs out over a fixed number of workers.
pub struct WorkerPool {
    config: WorkerPoolConfig,
    runner: Arc<dyn JobRunner>,
    stats: Arc<SharedPoolStats>,
}

impl WorkerPool {
    pub fn new(config: WorkerPoolConfig, runner: Arc<dyn JobRunner>) -> Self {
        Self {
            config,
            runner,
            stats: Arc::new(SharedPoolStats::new()),
        }
    }

    /// Runs every job and returns all results, in completion order.
    ///
    /// # Errors
    ///
    /// Returns the first local I/O error reported by any worker, after all
    /// workers have finished. Such an error only aborts the job that hit it.
    pub async fn run(&self, jobs: Vec<Job>) -> Result<Vec<TaskResult>, SchedulerError> {
        let num_workers = self.config.worker_count();
        let capacity = jobs.len().max(1);

        let (job_tx, job_rx) = mpsc::channel::<Job>(capacity);
        let (result_tx, mut result_rx) = mpsc::channel::<TaskResult>(capacity);
        let (error_tx, mut error_rx) = mpsc::channel::<SchedulerError>(capacity);

        for job in jobs {
            job_tx
                .send(job)
                .await
                .map_err(|_| SchedulerError::Worker("job queue closed".to_string()))?;
        }
        drop(job_tx);

        let queue = Arc::new(Mutex::new(job_rx));
        info!(num_workers, jobs = capacity, "Running jobs");

        let handles: Vec<JoinHandle<()>> = (0..num_workers)
            .map(|i| {
                let worker = Worker {
                    id: i,
                    queue: Arc::clone(&queue),
                    runner: Arc::clone(&self.runner),
                    config: self.config.clone(),
                    results: result_tx.clone(),
                    errors: error_tx.clone(),
                    stats: Arc::clone(&self.stats),
                };
                tokio::spawn(worker.run())
            })
            .collect();
        drop(result_tx);
        drop(error_tx);

        let mut first_error = None;
        for joined in futures::future::join_all(handles).await {
            if let Err(e) = joined {
                error!(error = %e, "Worker task panicked");
                first_error.get_or_insert(SchedulerError::Worker(e.to_string()));
            }
        }

        if let Ok(e) = error_rx.try_recv() {
            return Err(e);
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        let mut results = Vec::new();
        while let Some(result) = result_rx.recv().await {
            results.push(result);
        }
        Ok(results)
    }

    pub fn stats(&self) -> PoolStats {
        self.stats.to_pool_stats(self.config.worker_count())
    }
}

/// A single worker that processes jobs from the queue.
struct Worker {
    id: usize,
    queue: Arc<Mutex<mpsc::Receiver<Job>>>,
    runner: Arc<dyn JobRunner>,
    config: WorkerPoolConfig,
    results: mpsc::Sender<TaskResult>,
    errors: mpsc::Sender<SchedulerError>,
    stats: Arc<SharedPoolStats>,
}

impl Worker {
    async fn run(self) {
        let metrics = MetricsCollector::new();
        metrics.worker_started();
        debug!(worker_id = self.id, "Worker started");

        loop {
            // The lock is released before the job runs.
            let next = self.queue.lock().await.recv().await;
            let Some(job) = next else { break };

            if let Err(e) = self.process_job(job, &metrics).await {
                error!(worker_id = self.id, error = %e, "Job aborted");
                let _ = self.errors.send(e).await;
            }
        }

        metrics.worker_stopped();
        debug!(worker_id = self.id, "Worker stopped");
    }

    async fn process_job(&self, job: Job, metrics: &MetricsCollector) -> Result<(), SchedulerError> {
        let job_dir = job.job_dir(&self.config.output_dir);
        tokio::fs::create_dir_all(&job_dir)
            .await
            .map_err(|source| SchedulerError::OutputDir {
                path: job_dir.clone(),
                source,
            })?;

        let log_path = job_dir.join(LOG_FILE_NAME);
        let log = TaskLog::create(&log_path).map_err(|source| SchedulerError::LogSink {
            path: log_path.clone(),
            source,
        })?;

        let ctx = JobContext {
            job_dir: job_dir.clone(),
            log,
            kubeconfig: self.config.shared_kubeconfig.clone(),
        };

        info!(
            worker_id = self.id,
            job = %job.label(),
            job_id = %job.id,
            "Started job"
        );
        metrics.job_started();
        let start = Instant::now();

        let result = self.runner.run_job(&job, &ctx).await;

        let elapsed = start.elapsed();
        metrics.job_finished();
        metrics.record_job(
            result.result.as_str(),
            &job.agent_config.model_id,
            elapsed.as_secs_f64(),
        );
        self.stats.record(result.result, elapsed);
        info!(
            worker_id = self.id,
            job = %job.label(),
            outcome = %result.result,
            elapsed_secs = elapsed.as_secs(),
            "Completed job"
        );

        let result_path = job_dir.join(RESULT_FILE_NAME);
        let yaml = serde_yaml::to_string(&result).map_err(|e| SchedulerError::Persist {
            path: result_path.clone(),
            message: e.to_string(),
        })?;
        tokio::fs::write(&result_path, yaml)
            .await
            .map_err(|e| SchedulerError::Persist {
                path: result_path.clone(),
                message: e.to_string(),
            })?;

        self.results
            .send(result)
            .await
            .map_err(|_| SchedulerError::Worker("result channel closed".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::AgentConfig;
    use crate::task::Task;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    /// Tracks how many jobs run at once.
    #[derive(Default)]
    struct CountingRunner {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl JobRunner for CountingRunner {
        async fn run_job(&self, job: &Job, _ctx: &JobContext) -> TaskResult {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);

            let mut result = TaskResult::new(&job.task.id, job.agent_config.clone(), job.trial);
            result.set_success();
            result
        }
    }

    fn jobs(count: usize) -> Vec<Job> {
        let tasks: BTreeMap<String, Task> = (0..count)
            .map(|i| {
                let id = format!("task-{:02}", i);
                (id.clone(), Task::new(id.clone(), format!("/tasks/{}", id)))
            })
            .collect();
        super::super::build_jobs(&tasks, &[AgentConfig::new("gemini", "flash")], 1)
    }

    #[tokio::test]
    async fn test_pool_bounds_concurrency() {
        let out = TempDir::new().unwrap();
        let runner = Arc::new(CountingRunner::default());
        let pool = WorkerPool::new(WorkerPoolConfig::new(3, out.path()), runner.clone());

        let results = pool.run(jobs(10)).await.unwrap();

        assert_eq!(results.len(), 10);
        let mut tasks: Vec<_> = results.iter().map(|r| r.task.clone()).collect();
        tasks.sort();
        tasks.dedup();
        assert_eq!(tasks.len(), 10);
        assert!(runner.peak.load(Ordering::SeqCst) <= 3);
        assert!(runner.peak.load(Ordering::SeqCst) >= 2);

        let stats = pool.stats();
        assert_eq!(stats.jobs_succeeded, 10);
        assert_eq!(stats.success_rate(), 100.0);
    }

    #[tokio::test]
    async fn test_zero_workers_runs_sequentially() {
        let out = TempDir::new().unwrap();
        let runner = Arc::new(CountingRunner::default());
        let pool = WorkerPool::new(WorkerPoolConfig::new(0, out.path()), runner.clone());

        let results = pool.run(jobs(3)).await.unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(runner.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_persists_artifacts() {
        let out = TempDir::new().unwrap();
        let pool = WorkerPool::new(
            WorkerPoolConfig::new(2, out.path()),
            Arc::new(CountingRunner::default()),
        );

        pool.run(jobs(2)).await.unwrap();

        let job_dir = out
            .path()
            .join("task-00")
            .join("gemini-flash-shim_disabled")
            .join("trial-0");
        assert!(job_dir.join(LOG_FILE_NAME).exists());
        let yaml = std::fs::read_to_string(job_dir.join(RESULT_FILE_NAME)).unwrap();
        let saved: TaskResult = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(saved.task, "task-00");
        assert_eq!(saved.result, Outcome::Success);
    }

    #[tokio::test]
    async fn test_output_dir_failure_is_reported() {
        let out = TempDir::new().unwrap();
        // A regular file where the task directory should go.
        std::fs::write(out.path().join("task-00"), "not a dir").unwrap();

        let pool = WorkerPool::new(
            WorkerPoolConfig::new(2, out.path()),
            Arc::new(CountingRunner::default()),
        );

        let err = pool.run(jobs(3)).await.unwrap_err();
        assert!(matches!(err, SchedulerError::OutputDir { .. }));
        // Other jobs still ran.
        assert!(out
            .path()
            .join("task-01/gemini-flash-shim_disabled/trial-0")
            .join(RESULT_FILE_NAME)
            .exists());
    }

    #[tokio::test]
    async fn test_empty_job_set() {
        let out = TempDir::new().unwrap();
        let pool = WorkerPool::new(
            WorkerPoolConfig::new(4, out.path()),
            Arc::new(CountingRunner::default()),
        );
        assert!(pool.run(Vec::new()).await.unwrap().is_empty());
    }
}
