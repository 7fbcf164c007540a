//! Configuration for evaluation runs.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::agent::AgentConfig;
use crate::cluster::{ProviderKind, ProviderSettings};

/// Name of the long-lived cluster shared by tasks in `shared` isolation.
pub const SHARED_CLUSTER_NAME: &str = "k8s-bench-eval";

/// How the run-level shared cluster is prepared before scheduling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClusterCreationPolicy {
    /// Delete any existing shared cluster, then create a fresh one.
    AlwaysCreate,
    /// Reuse the shared cluster when it already exists.
    #[default]
    CreateIfNotExist,
    /// Never touch the backend; use the configured kubeconfig as-is.
    DoNotCreate,
}

impl std::fmt::Display for ClusterCreationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusterCreationPolicy::AlwaysCreate => write!(f, "always-create"),
            ClusterCreationPolicy::CreateIfNotExist => write!(f, "create-if-not-exist"),
            ClusterCreationPolicy::DoNotCreate => write!(f, "do-not-create"),
        }
    }
}

impl std::str::FromStr for ClusterCreationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "always-create" | "always" => Ok(ClusterCreationPolicy::AlwaysCreate),
            "create-if-not-exist" | "if-not-exist" => Ok(ClusterCreationPolicy::CreateIfNotExist),
            "do-not-create" | "never" => Ok(ClusterCreationPolicy::DoNotCreate),
            other => Err(format!("Unknown cluster creation policy: {}", other)),
        }
    }
}

/// Configuration for one evaluation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalConfig {
    /// Path of the agent executable under evaluation.
    pub agent_bin: PathBuf,
    /// Directory holding one subdirectory per task.
    pub tasks_dir: PathBuf,
    /// Regex selecting task identifiers.
    pub task_pattern: Option<String>,
    /// Root of all per-job artifacts.
    pub output_dir: PathBuf,
    /// Number of workers. Zero is treated as one.
    pub concurrency: usize,
    /// Independent runs per (task, configuration) pair.
    pub trials: usize,
    pub agent_configs: Vec<AgentConfig>,
    pub provider: ProviderKind,
    pub creation_policy: ClusterCreationPolicy,
    /// Kubeconfig used when the shared cluster is not managed by the run.
    pub kubeconfig: Option<PathBuf>,
    pub provider_settings: ProviderSettings,
}

impl EvalConfig {
    /// Creates a configuration with defaults for everything but the paths.
    pub fn new(
        agent_bin: impl Into<PathBuf>,
        tasks_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            agent_bin: agent_bin.into(),
            tasks_dir: tasks_dir.into(),
            task_pattern: None,
            output_dir: output_dir.into(),
            concurrency: 1,
            trials: 1,
            agent_configs: Vec::new(),
            provider: ProviderKind::default(),
            creation_policy: ClusterCreationPolicy::default(),
            kubeconfig: None,
            provider_settings: ProviderSettings::default(),
        }
    }

    pub fn with_task_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.task_pattern = Some(pattern.into());
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_trials(mut self, trials: usize) -> Self {
        self.trials = trials;
        self
    }

    pub fn with_agent_config(mut self, config: AgentConfig) -> Self {
        self.agent_configs.push(config);
        self
    }

    pub fn with_agent_configs(mut self, configs: Vec<AgentConfig>) -> Self {
        self.agent_configs = configs;
        self
    }

    pub fn with_provider(mut self, provider: ProviderKind) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_creation_policy(mut self, policy: ClusterCreationPolicy) -> Self {
        self.creation_policy = policy;
        self
    }

    pub fn with_kubeconfig(mut self, path: impl Into<PathBuf>) -> Self {
        self.kubeconfig = Some(path.into());
        self
    }

    pub fn with_provider_settings(mut self, settings: ProviderSettings) -> Self {
        self.provider_settings = settings;
        self
    }

    /// Worker count with non-positive values normalized to one.
    pub fn worker_count(&self) -> usize {
        self.concurrency.max(1)
    }

    pub fn trial_count(&self) -> usize {
        self.trials.max(1)
    }

    /// Path of the line-delimited trial record stream.
    pub fn records_path(&self) -> PathBuf {
        self.output_dir.join(crate::scoring::RECORDS_FILE_NAME)
    }

    /// Kubeconfig used by shared-isolation jobs when no shared cluster is prepared.
    pub fn kubeconfig_path(&self) -> &Path {
        self.kubeconfig
            .as_deref()
            .unwrap_or_else(|| Path::new(""))
    }
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self::new("kubectl-ai", "./tasks", "./.build/results")
    }
}
