//! Per-job results.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::agent::AgentConfig;

/// Final classification of one job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// The verifier passed, or every declared expectation matched.
    Success,
    /// The task was not accomplished, including timeouts.
    #[default]
    Fail,
    /// Infrastructure or process failure outside the task's own correctness.
    Error,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Fail => "fail",
            Outcome::Error => "error",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "success" => Ok(Outcome::Success),
            "fail" => Ok(Outcome::Fail),
            "error" => Ok(Outcome::Error),
            other => Err(format!("Unknown outcome: {}", other)),
        }
    }
}

/// An assertion-level failure: an unmet expectation, a failed verifier, or a timeout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub message: String,
}

impl Failure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Result of running one task under one agent configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task: String,
    pub agent_config: AgentConfig,
    /// Zero-based trial index.
    #[serde(default)]
    pub trial: usize,
    pub result: Outcome,
    /// Diagnostic for `error` outcomes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<Failure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub duration_secs: f64,
}

impl TaskResult {
    /// Creates a pending result. Until a verdict is recorded the outcome is `fail`.
    pub fn new(task: impl Into<String>, agent_config: AgentConfig, trial: usize) -> Self {
        Self {
            task: task.into(),
            agent_config,
            trial,
            result: Outcome::Fail,
            error: None,
            failures: Vec::new(),
            difficulty: None,
            started_at: Utc::now(),
            duration_secs: 0.0,
        }
    }

    pub fn with_difficulty(mut self, difficulty: Option<String>) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn add_failure(&mut self, message: impl Into<String>) {
        self.failures.push(Failure::new(message));
    }

    /// Marks the job successful. Success never carries failures.
    pub fn set_success(&mut self) {
        self.result = Outcome::Success;
        self.error = None;
        self.failures.clear();
    }

    pub fn set_fail(&mut self) {
        self.result = Outcome::Fail;
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.result = Outcome::Error;
        self.error = Some(message.into());
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.duration_secs = duration.as_secs_f64();
    }

    pub fn is_success(&self) -> bool {
        self.result == Outcome::Success
    }

    /// A single human-readable diagnostic: the error, or the joined failures.
    pub fn message(&self) -> Option<String> {
        if let Some(ref error) = self.error {
            return Some(error.clone());
        }
        if self.failures.is_empty() {
            return None;
        }
        Some(
            self.failures
                .iter()
                .map(|f| f.message.as_str())
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// Counts of results by outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub success: usize,
    pub fail: usize,
    pub error: usize,
}

impl OutcomeCounts {
    pub fn from_results(results: &[TaskResult]) -> Self {
        let mut counts = Self::default();
        for r in results {
            match r.result {
                Outcome::Success => counts.success += 1,
                Outcome::Fail => counts.fail += 1,
                Outcome::Error => counts.error += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.success + self.fail + self.error
    }
}
