//! Error types for kube-agent-bench operations.
//!
//! Defines error types for the major subsystems:
//! - Cluster provisioning and teardown
//! - Task loading and parsing
//! - Task execution (setup, agent process, verification)
//! - Teardown of per-job resources
//! - Scheduling and artifact persistence
//! - Offline scoring

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while managing ephemeral clusters.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("Failed to query cluster backend '{backend}': {message}")]
    BackendQuery { backend: String, message: String },

    #[error("Failed to provision cluster '{name}' after {attempts} attempts: {source}")]
    Provisioning {
        name: String,
        attempts: u32,
        #[source]
        source: Box<ClusterError>,
    },

    #[error("Command `{command}` failed: {message}")]
    Command { command: String, message: String },

    #[error("Unknown cluster provider: {0}")]
    UnknownProvider(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Aggregated teardown failures.
///
/// Logged by the state machine, never promoted to the job's outcome.
#[derive(Debug, Error)]
#[error("{} cleanup action(s) failed: {}", .failures.len(), .failures.join("; "))]
pub struct CleanupError {
    pub failures: Vec<String>,
}

/// Errors that can occur while loading task specifications.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Failed to read task file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse task file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid task pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Failed to read prompt file {path}: {source}")]
    PromptFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised inside the per-task execution state machine.
///
/// None of these escape the state machine: they are folded into the
/// job's `TaskResult` as an `error` outcome.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Failed to create isolated cluster '{name}': {source}")]
    Provision {
        name: String,
        #[source]
        source: ClusterError,
    },

    #[error("Setup failed: {0}")]
    Setup(String),

    #[error("{0}")]
    AgentProcess(String),

    #[error("Failed to resolve prompt: {0}")]
    Prompt(#[from] TaskError),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that abort a whole evaluation run.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Creating directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Creating log file {path}: {source}")]
    LogSink {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Writing results to {path}: {message}")]
    Persist { path: PathBuf, message: String },

    #[error("Worker task failed: {0}")]
    Worker(String),

    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("Task loading error: {0}")]
    Task(#[from] TaskError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur in the offline scoring pass.
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("Failed to read results file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No trial records found")]
    NoRecords,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provisioning_error_wraps_last_cause() {
        let err = ClusterError::Provisioning {
            name: "k8s-bench-a".to_string(),
            attempts: 3,
            source: Box::new(ClusterError::Command {
                command: "kind create cluster".to_string(),
                message: "exit status 1".to_string(),
            }),
        };
        let msg = err.to_string();
        assert!(msg.contains("k8s-bench-a"));
        assert!(msg.contains("3 attempts"));
        assert!(msg.contains("exit status 1"));
    }

    #[test]
    fn test_cleanup_error_joins_all_failures() {
        let err = CleanupError {
            failures: vec!["delete cluster a".to_string(), "remove file b".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "2 cleanup action(s) failed: delete cluster a; remove file b"
        );
    }

    #[test]
    fn test_task_parse_error_names_path() {
        let yaml_err = serde_yaml::from_str::<serde_yaml::Value>("a: [").unwrap_err();
        let err = TaskError::Parse {
            path: PathBuf::from("tasks/broken/task.yaml"),
            source: yaml_err,
        };
        assert!(err.to_string().contains("tasks/broken/task.yaml"));
    }
}
