//! Bounded-concurrency job scheduling.
//!
//! - **Job**: one (task, agent configuration, trial) triple
//! - **WorkerPool**: a fixed number of workers draining a bounded queue
//! - **run_evaluation**: the whole run, from task loading to the record stream
//!
//! # Architecture
//!
//! ```text
//!                   ┌──────────────────┐
//!                   │ tasks × configs  │
//!                   │     × trials     │
//!                   └────────┬─────────┘
//!                            │
//!                   ┌────────▼─────────┐
//!                   │  bounded queue   │
//!                   └────────┬─────────┘
//!                            │
//!         ┌──────────────────┼──────────────────┐
//!         ▼                  ▼                  ▼
//!    ┌─────────┐        ┌─────────┐        ┌─────────┐
//!    │ Worker 1│        │ Worker 2│        │ Worker N│
//!    └────┬────┘        └────┬────┘        └────┬────┘
//!         └──── results ─────┴───── errors ─────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use kube_agent_bench::runner::{AgentConfig, EvalConfig};
//! use kube_agent_bench::scheduler::run_evaluation;
//!
//! let config = EvalConfig::new("./kubectl-ai", "./tasks", "./.build/results")
//!     .with_concurrency(4)
//!     .with_agent_config(AgentConfig::new("gemini", "gemini-2.5-pro"));
//!
//! let summary = run_evaluation(&config).await?;
//! println!("{} results", summary.results.len());
//! ```

pub mod evaluation;
pub mod job;
pub mod worker_pool;

pub use evaluation::{prepare_shared_cluster, run_evaluation, EvaluationSummary, SharedCluster};
pub use job::{build_jobs, Job};
pub use worker_pool::{PoolStats, WorkerPool, WorkerPoolConfig, LOG_FILE_NAME, RESULT_FILE_NAME};
