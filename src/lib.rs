//! kube-agent-bench: benchmark harness for Kubernetes operations agents.
//!
//! Runs an agent binary against declarative tasks, each in a shared or
//! ephemeral cluster, and scores repeated trials with pass@k.

pub mod cli;
pub mod cluster;
pub mod error;
pub mod metrics;
pub mod runner;
pub mod scheduler;
pub mod scoring;
pub mod task;

// Re-export commonly used error types
pub use error::{
    CleanupError, ClusterError, RunnerError, SchedulerError, ScoringError, TaskError,
};
