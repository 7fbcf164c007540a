//! Task file schema.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::TaskError;

/// Deadline applied to a task that does not declare its own timeout.
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Whether a task runs against the shared cluster or its own instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IsolationMode {
    /// All jobs share one long-lived cluster.
    #[default]
    #[serde(rename = "shared", alias = "")]
    Shared,
    /// Each job provisions and tears down its own cluster.
    #[serde(rename = "cluster", alias = "per-task-cluster")]
    PerTaskCluster,
}

impl std::fmt::Display for IsolationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IsolationMode::Shared => write!(f, "shared"),
            IsolationMode::PerTaskCluster => write!(f, "per-task-cluster"),
        }
    }
}

/// One prompt fed to the agent, either inline or from a file in the task directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(
        default,
        alias = "prompt_file",
        skip_serializing_if = "Option::is_none"
    )]
    pub prompt_file: Option<String>,
}

impl ScriptStep {
    /// Inline prompt step.
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(prompt.into()),
            prompt_file: None,
        }
    }

    /// Prompt step read from a file relative to the task directory.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            prompt: None,
            prompt_file: Some(path.into()),
        }
    }

    /// Returns the prompt text. A prompt file takes precedence over inline text.
    pub fn resolve_prompt(&self, task_dir: &Path) -> Result<String, TaskError> {
        if let Some(ref file) = self.prompt_file {
            let path = task_dir.join(file);
            return fs::read_to_string(&path)
                .map(|s| s.trim_end().to_string())
                .map_err(|source| TaskError::PromptFile { path, source });
        }
        Ok(self.prompt.clone().unwrap_or_default())
    }
}

/// A regex the output of the agent's last command must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expectation {
    #[serde(default)]
    pub contains: String,
}

impl Expectation {
    pub fn contains(pattern: impl Into<String>) -> Self {
        Self {
            contains: pattern.into(),
        }
    }
}

/// A benchmark task as declared in `task.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Directory name of the task. Filled in by the loader.
    #[serde(skip)]
    pub id: String,
    /// Absolute path of the task directory. Filled in by the loader.
    #[serde(skip)]
    pub dir: PathBuf,
    /// Setup script, relative to the task directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup: Option<String>,
    /// Cleanup script, relative to the task directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanup: Option<String>,
    /// Verifier executable, relative to the task directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub disabled: bool,
    /// Prompts sent to the agent, in order.
    #[serde(default)]
    pub script: Vec<ScriptStep>,
    #[serde(default)]
    pub expect: Vec<Expectation>,
    #[serde(default, with = "humantime_opt", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub isolation: IsolationMode,
}

impl Task {
    /// Creates an empty task rooted at `dir`.
    pub fn new(id: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            dir: dir.into(),
            ..Default::default()
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.script.push(ScriptStep::text(prompt));
        self
    }

    pub fn with_expectation(mut self, pattern: impl Into<String>) -> Self {
        self.expect.push(Expectation::contains(pattern));
        self
    }

    pub fn with_setup(mut self, script: impl Into<String>) -> Self {
        self.setup = Some(script.into());
        self
    }

    pub fn with_cleanup(mut self, script: impl Into<String>) -> Self {
        self.cleanup = Some(script.into());
        self
    }

    pub fn with_verifier(mut self, script: impl Into<String>) -> Self {
        self.verifier = Some(script.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_isolation(mut self, isolation: IsolationMode) -> Self {
        self.isolation = isolation;
        self
    }

    /// The task's deadline, falling back to [`DEFAULT_TASK_TIMEOUT`].
    pub fn effective_timeout(&self) -> Duration {
        self.timeout.unwrap_or(DEFAULT_TASK_TIMEOUT)
    }

    /// A task with neither expectations nor a verifier can never succeed.
    pub fn has_success_criteria(&self) -> bool {
        !self.expect.is_empty() || self.verifier.is_some()
    }

    /// Resolves a script path declared in the task file against the task directory.
    pub fn script_path(&self, relative: &str) -> PathBuf {
        self.dir.join(relative)
    }
}

/// Serde adapter for optional `humantime` duration strings such as `"90s"` or `"1m30s"`.
mod humantime_opt {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(d) => serializer.serialize_str(&humantime::format_duration(*d).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => humantime::parse_duration(s)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}
