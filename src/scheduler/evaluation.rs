//! Run-level orchestration: shared cluster, job fan-out, record stream.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::NamedTempFile;
use tracing::{info, warn};

use super::job::build_jobs;
use super::worker_pool::{PoolStats, WorkerPool, WorkerPoolConfig};
use crate::cluster::{create_provider, ClusterProvider};
use crate::error::SchedulerError;
use crate::runner::{ClusterCreationPolicy, EvalConfig, TaskExecutor, TaskResult, SHARED_CLUSTER_NAME};
use crate::scoring::append_records;
use crate::task::load_tasks;

/// Credentials for the cluster shared by `shared`-isolation jobs.
///
/// When the run prepared the cluster itself, the kubeconfig lives in a
/// temporary file that is removed when this value is dropped.
#[derive(Debug)]
pub struct SharedCluster {
    kubeconfig: PathBuf,
    _file: Option<NamedTempFile>,
}

impl SharedCluster {
    pub fn kubeconfig(&self) -> &Path {
        &self.kubeconfig
    }
}

/// Prepares the shared cluster according to the creation policy.
pub async fn prepare_shared_cluster(
    config: &EvalConfig,
    provider: &dyn ClusterProvider,
) -> Result<SharedCluster, SchedulerError> {
    if config.creation_policy == ClusterCreationPolicy::DoNotCreate {
        return Ok(SharedCluster {
            kubeconfig: config.kubeconfig_path().to_path_buf(),
            _file: None,
        });
    }

    let name = SHARED_CLUSTER_NAME;
    let mut exists = provider.exists(name).await?;

    if config.creation_policy == ClusterCreationPolicy::AlwaysCreate && exists {
        info!(cluster = %name, provider = %provider.kind(), "Deleting existing cluster for evaluation run");
        provider.delete(name).await?;
        exists = false;
    }

    if !exists {
        info!(cluster = %name, provider = %provider.kind(), "Creating cluster for evaluation run");
        provider.create(name).await?;
    }

    let kubeconfig = provider.kubeconfig(name).await?;
    let mut file = tempfile::Builder::new()
        .prefix("kubeconfig-")
        .suffix(".yaml")
        .tempfile()?;
    file.write_all(&kubeconfig)?;
    file.flush()?;

    info!(path = %file.path().display(), "Wrote shared kubeconfig");
    Ok(SharedCluster {
        kubeconfig: file.path().to_path_buf(),
        _file: Some(file),
    })
}

/// Everything a finished run produced.
#[derive(Debug)]
pub struct EvaluationSummary {
    pub results: Vec<TaskResult>,
    pub stats: PoolStats,
    pub records_path: PathBuf,
}

/// Loads tasks, prepares the shared cluster, runs every job and appends the
/// trial records.
pub async fn run_evaluation(config: &EvalConfig) -> Result<EvaluationSummary, SchedulerError> {
    let tasks = load_tasks(&config.tasks_dir, config.task_pattern.as_deref())?;
    if config.agent_configs.is_empty() {
        warn!("No agent configurations given, nothing to run");
    }

    std::fs::create_dir_all(&config.output_dir).map_err(|source| SchedulerError::OutputDir {
        path: config.output_dir.clone(),
        source,
    })?;

    let provider = create_provider(config.provider, &config.provider_settings);
    let shared = prepare_shared_cluster(config, provider.as_ref()).await?;

    let jobs = build_jobs(&tasks, &config.agent_configs, config.trial_count());
    info!(
        tasks = tasks.len(),
        configs = config.agent_configs.len(),
        trials = config.trial_count(),
        jobs = jobs.len(),
        concurrency = config.worker_count(),
        "Starting evaluation"
    );

    let pool = WorkerPool::new(
        WorkerPoolConfig::new(config.worker_count(), &config.output_dir)
            .with_shared_kubeconfig(shared.kubeconfig()),
        Arc::new(TaskExecutor::new(&config.agent_bin, Arc::clone(&provider))),
    );
    let results = pool.run(jobs).await?;

    let records_path = config.records_path();
    append_records(&records_path, &results).map_err(|e| SchedulerError::Persist {
        path: records_path.clone(),
        message: e.to_string(),
    })?;

    Ok(EvaluationSummary {
        results,
        stats: pool.stats(),
        records_path,
    })
}
