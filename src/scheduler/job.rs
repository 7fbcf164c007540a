//! Job definitions for the scheduler.
//!
//! A `Job` pairs one task with one agent configuration and a trial index.
//! Jobs are immutable once built and each produces exactly one
//! [`TaskResult`](crate::runner::TaskResult).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use uuid::Uuid;

use crate::runner::AgentConfig;
use crate::task::Task;

/// A unit of work executed by one worker.
#[derive(Debug, Clone)]
pub struct Job {
    /// Unique identifier, used only for log correlation.
    pub id: Uuid,
    pub task: Arc<Task>,
    pub agent_config: AgentConfig,
    /// Zero-based trial index.
    pub trial: usize,
}

impl Job {
    pub fn new(task: Arc<Task>, agent_config: AgentConfig, trial: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            task,
            agent_config,
            trial,
        }
    }

    /// Artifact directory: `<root>/<task>/<config>/trial-<n>`.
    pub fn job_dir(&self, output_root: &Path) -> PathBuf {
        output_root
            .join(&self.task.id)
            .join(&self.agent_config.id)
            .join(format!("trial-{}", self.trial))
    }

    /// Short label for logs.
    pub fn label(&self) -> String {
        format!(
            "{}/{}#{}",
            self.task.id, self.agent_config.id, self.trial
        )
    }
}

/// Builds the job set: every task under every configuration, `trials` times.
///
/// Ordering is task, then configuration, then trial.
pub fn build_jobs(
    tasks: &BTreeMap<String, Task>,
    agent_configs: &[AgentConfig],
    trials: usize,
) -> Vec<Job> {
    let trials = trials.max(1);
    let mut jobs = Vec::with_capacity(tasks.len() * agent_configs.len() * trials);

    for task in tasks.values() {
        let task = Arc::new(task.clone());
        for config in agent_configs {
            for trial in 0..trials {
                jobs.push(Job::new(Arc::clone(&task), config.clone(), trial));
            }
        }
    }

    jobs
}
