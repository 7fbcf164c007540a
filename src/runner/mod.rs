//! Task execution against an agent binary and a Kubernetes cluster.
//!
//! This module provides everything needed to run one job:
//!
//! - [`EvalConfig`]: run-level configuration
//! - [`AgentConfig`]: one agent/model combination and its command line
//! - [`TaskExecutor`]: the per-job state machine
//! - [`TaskResult`]: the normalized outcome of a job
//!
//! # Architecture
//!
//! ```text
//! Job → Provision → Setup → Agent (prompts on stdin) → Verify → Cleanup → TaskResult
//! ```
//!
//! # Example
//!
//! ```ignore
//! use kube_agent_bench::cluster::{create_provider, ProviderKind, ProviderSettings};
//! use kube_agent_bench::runner::{AgentConfig, JobContext, TaskExecutor, TaskLog};
//!
//! let provider = create_provider(ProviderKind::Kind, &ProviderSettings::default());
//! let executor = TaskExecutor::new("./kubectl-ai", provider);
//! let ctx = JobContext {
//!     job_dir: "./out/scale/gemini/trial-0".into(),
//!     log: TaskLog::in_memory(),
//!     kubeconfig: "/home/me/.kube/config".into(),
//! };
//! let result = executor
//!     .execute(&task, &AgentConfig::new("gemini", "gemini-2.5-pro"), 0, &ctx)
//!     .await;
//! println!("{}: {}", result.task, result.result);
//! ```

pub mod agent;
pub mod config;
pub mod execution;
pub mod process;
pub mod result;
pub mod verifier;

pub use agent::AgentConfig;
pub use config::{ClusterCreationPolicy, EvalConfig, SHARED_CLUSTER_NAME};
pub use execution::{isolated_cluster_name, JobContext, JobRunner, TaskExecutor};
pub use process::{last_n_lines, run_logged, TaskLog};
pub use result::{Failure, Outcome, OutcomeCounts, TaskResult};
pub use verifier::{last_command_output, match_expectations, COMMAND_MARKER};
