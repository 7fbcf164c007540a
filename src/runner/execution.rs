//! Per-job execution state machine.
//!
//! ```text
//! Provision ──▶ Setup ──▶ AgentRun ──▶ Verify ──▶ Cleanup ──▶ Done
//! └──────────── one deadline ──────────────────┘   (no deadline)
//! ```
//!
//! Any phase may end the job early; cleanup always runs.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::agent::AgentConfig;
use super::process::{display_command, run_logged, TaskLog};
use super::result::TaskResult;
use super::verifier::match_expectations;
use crate::cluster::{ClusterProvider, Teardown, TeardownStack};
use crate::error::RunnerError;
use crate::scheduler::Job;
use crate::task::{IsolationMode, Task};

/// Log lines attached to setup and agent process errors.
const ERROR_EXCERPT_LINES: usize = 3;

/// Log lines attached to verifier failures.
const VERIFIER_EXCERPT_LINES: usize = 20;

pub const KUBECONFIG_FILE_NAME: &str = "kubeconfig.yaml";
pub const TRACE_FILE_NAME: &str = "trace.yaml";

/// Everything a job needs from the worker that runs it.
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Job-scoped artifact directory.
    pub job_dir: PathBuf,
    pub log: TaskLog,
    /// Kubeconfig of the shared cluster.
    pub kubeconfig: PathBuf,
}

/// Executes one job to completion. Never fails: problems become the
/// result's outcome.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run_job(&self, job: &Job, ctx: &JobContext) -> TaskResult;
}

/// Runs jobs against the agent binary and a cluster provider.
pub struct TaskExecutor {
    agent_bin: PathBuf,
    provider: Arc<dyn ClusterProvider>,
}

impl TaskExecutor {
    pub fn new(agent_bin: impl Into<PathBuf>, provider: Arc<dyn ClusterProvider>) -> Self {
        Self {
            agent_bin: agent_bin.into(),
            provider,
        }
    }

    /// Runs `task` under `agent` and returns its result.
    pub async fn execute(
        &self,
        task: &Task,
        agent: &AgentConfig,
        trial: usize,
        ctx: &JobContext,
    ) -> TaskResult {
        let start = Instant::now();
        let timeout = task.effective_timeout();
        let isolation = if self.provider.kind().forces_isolation() {
            IsolationMode::PerTaskCluster
        } else {
            task.isolation
        };

        let mut execution = TaskExecution {
            task,
            agent,
            agent_bin: &self.agent_bin,
            provider: self.provider.as_ref(),
            ctx,
            isolation,
            kubeconfig: ctx.kubeconfig.clone(),
            teardown: TeardownStack::new(),
            result: TaskResult::new(&task.id, agent.clone(), trial)
                .with_difficulty(task.difficulty.clone()),
            deadline: start + timeout,
            timeout,
        };

        let outcome = execution.run_phases().await;
        execution.record(outcome);
        execution.cleanup().await;

        let mut result = execution.result;
        result.set_duration(start.elapsed());
        result
    }
}

#[async_trait]
impl JobRunner for TaskExecutor {
    async fn run_job(&self, job: &Job, ctx: &JobContext) -> TaskResult {
        self.execute(&job.task, &job.agent_config, job.trial, ctx)
            .await
    }
}

/// Cluster name for a per-task cluster. Unique per job so concurrent trials
/// of the same task never collide.
pub fn isolated_cluster_name(task_id: &str) -> String {
    let sanitized: String = task_id
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let suffix = Uuid::new_v4().simple().to_string();
    // kind and vcluster names must stay within DNS label length.
    let prefix: String = sanitized.chars().take(40).collect();
    format!("k8s-bench-{}-{}", prefix.trim_end_matches('-'), &suffix[..8])
}

struct TaskExecution<'a> {
    task: &'a Task,
    agent: &'a AgentConfig,
    agent_bin: &'a Path,
    provider: &'a dyn ClusterProvider,
    ctx: &'a JobContext,
    isolation: IsolationMode,
    kubeconfig: PathBuf,
    teardown: TeardownStack,
    result: TaskResult,
    deadline: Instant,
    timeout: Duration,
}

impl TaskExecution<'_> {
    /// Provision through Verify, all under the job deadline.
    async fn run_phases(&mut self) -> Result<(), RunnerError> {
        let deadline = self.deadline;
        let timeout = self.timeout;
        let expired = move |_: tokio::time::error::Elapsed| RunnerError::Timeout(timeout);

        timeout_at(deadline, self.provision()).await.map_err(expired)??;
        timeout_at(deadline, self.setup()).await.map_err(expired)??;
        let transcript = timeout_at(deadline, self.run_agent())
            .await
            .map_err(expired)??;
        timeout_at(deadline, self.verify(transcript))
            .await
            .map_err(expired)?
    }

    fn record(&mut self, outcome: Result<(), RunnerError>) {
        match outcome {
            Ok(()) => {}
            Err(RunnerError::Timeout(timeout)) => {
                warn!(task_id = %self.task.id, ?timeout, "Task timed out");
                self.result.failures.clear();
                self.result.add_failure(format!(
                    "task timed out after {}",
                    humantime::format_duration(timeout)
                ));
                self.result.set_fail();
            }
            Err(e) => {
                warn!(task_id = %self.task.id, error = %e, "Task ended with error");
                self.result.set_error(e.to_string());
            }
        }
    }

    async fn provision(&mut self) -> Result<(), RunnerError> {
        if self.isolation != IsolationMode::PerTaskCluster {
            return Ok(());
        }

        let name = isolated_cluster_name(&self.task.id);
        info!(task_id = %self.task.id, cluster = %name, "Creating isolated cluster");

        // Registered before creation so a partially created cluster is torn down too.
        self.teardown.push(Teardown::DeleteCluster { name: name.clone() });

        // From here on the job never addresses the shared cluster, even if
        // provisioning fails before credentials exist.
        let path = self.ctx.job_dir.join(KUBECONFIG_FILE_NAME);
        self.kubeconfig = path.clone();
        self.teardown.push(Teardown::RemoveFile { path: path.clone() });

        self.provider
            .create(&name)
            .await
            .map_err(|source| RunnerError::Provision {
                name: name.clone(),
                source,
            })?;

        let kubeconfig = self
            .provider
            .kubeconfig(&name)
            .await
            .map_err(|source| RunnerError::Provision {
                name: name.clone(),
                source,
            })?;

        tokio::fs::write(&path, kubeconfig).await?;
        Ok(())
    }

    async fn setup(&mut self) -> Result<(), RunnerError> {
        let Some(setup) = self.task.setup.clone() else {
            return Ok(());
        };

        if let Err(message) = self.run_script(&setup).await {
            let excerpt = self.ctx.log.excerpt(ERROR_EXCERPT_LINES).await;
            return Err(RunnerError::Setup(format!(
                "{}\n---LOG---\n{}",
                message, excerpt
            )));
        }
        Ok(())
    }

    /// Feeds the prompts to the agent and returns its stdout.
    async fn run_agent(&mut self) -> Result<String, RunnerError> {
        let prompts = self
            .task
            .script
            .iter()
            .map(|step| step.resolve_prompt(&self.task.dir))
            .collect::<Result<Vec<_>, _>>()?;

        let trace_path = self.ctx.job_dir.join(TRACE_FILE_NAME);
        let mut cmd = Command::new(self.agent_bin);
        cmd.args(self.agent.agent_args(&self.kubeconfig, &trace_path))
            .env("KUBECONFIG", &self.kubeconfig);

        info!(
            task_id = %self.task.id,
            config = %self.agent.id,
            prompts = prompts.len(),
            "Starting agent"
        );

        let failure = match run_logged(cmd, &self.ctx.log, Some(prompts), true).await {
            Ok(output) if output.status.success() => return Ok(output.stdout),
            Ok(output) => output.status.to_string(),
            Err(e) => e.to_string(),
        };

        let excerpt = self.ctx.log.excerpt(ERROR_EXCERPT_LINES).await;
        Err(RunnerError::AgentProcess(format!(
            "agent encountered error: {}\n---LOG---\n{}",
            failure, excerpt
        )))
    }

    async fn verify(&mut self, transcript: String) -> Result<(), RunnerError> {
        let expectation_failures = match_expectations(&self.task.expect, &transcript);
        let expectations_met = !self.task.expect.is_empty() && expectation_failures.is_empty();
        if expectations_met {
            info!(task_id = %self.task.id, "All output expectations met");
        }

        let mut verifier_succeeded = false;
        if let Some(verifier) = self.task.verifier.clone() {
            info!(task_id = %self.task.id, "Running verifier");
            match self.run_script(&verifier).await {
                Ok(()) => verifier_succeeded = true,
                Err(message) => {
                    let excerpt = self.ctx.log.excerpt(VERIFIER_EXCERPT_LINES).await;
                    self.result.add_failure(format!(
                        "verifier script failed: {}\n---LOG---\n{}",
                        message, excerpt
                    ));
                }
            }
        }

        if verifier_succeeded || expectations_met {
            self.result.set_success();
        } else {
            self.result.set_fail();
            self.result.failures.extend(expectation_failures);
        }
        Ok(())
    }

    /// Runs a task script with the job's credentials. The error is a
    /// human-readable description of what went wrong.
    async fn run_script(&self, relative: &str) -> Result<(), String> {
        let mut cmd = Command::new(self.task.script_path(relative));
        cmd.current_dir(&self.task.dir)
            .env("KUBECONFIG", &self.kubeconfig);
        let cmdline = display_command(&cmd);

        match run_logged(cmd, &self.ctx.log, None, false).await {
            Ok(output) if output.status.success() => Ok(()),
            Ok(output) => Err(format!("running command {}: {}", cmdline, output.status)),
            Err(e) => Err(format!("running command {}: {}", cmdline, e)),
        }
    }

    /// Best-effort cleanup script, then teardown in reverse order.
    /// Nothing here changes the recorded outcome.
    async fn cleanup(&mut self) {
        if let Some(cleanup) = self.task.cleanup.clone() {
            if let Err(message) = self.run_script(&cleanup).await {
                warn!(task_id = %self.task.id, error = %message, "Cleanup script failed");
            }
        }

        let teardown = std::mem::take(&mut self.teardown);
        if teardown.is_empty() {
            return;
        }
        debug!(task_id = %self.task.id, actions = teardown.len(), "Running teardown");
        if let Err(e) = teardown.run(self.provider).await {
            warn!(task_id = %self.task.id, error = %e, "Cleanup failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isolated_cluster_name() {
        let a = isolated_cluster_name("Scale_Deployment");
        let b = isolated_cluster_name("Scale_Deployment");
        assert!(a.starts_with("k8s-bench-scale-deployment-"));
        assert_ne!(a, b);
        assert_eq!(a.len(), "k8s-bench-scale-deployment-".len() + 8);
    }

    #[test]
    fn test_isolated_cluster_name_is_bounded() {
        let name = isolated_cluster_name(&"x".repeat(200));
        assert!(name.len() <= 63);
    }
}
