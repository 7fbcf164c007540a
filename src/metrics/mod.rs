//! Prometheus metrics for benchmark runs.
//!
//! Recording is a no-op until [`init_metrics`] has been called, so library
//! code can record unconditionally.
//!
//! # Example
//!
//! ```ignore
//! use kube_agent_bench::metrics::{init_metrics, export_metrics, MetricsCollector};
//!
//! init_metrics()?;
//! let collector = MetricsCollector::new();
//! collector.record_job("success", "gemini-2.5-pro", 120.5);
//! std::fs::write("metrics.prom", export_metrics())?;
//! ```

pub mod collectors;
pub mod prometheus;

pub use collectors::MetricsCollector;
pub use prometheus::{export_metrics, init_metrics};

pub use prometheus::{
    ACTIVE_WORKERS, CLUSTER_PROVISIONS_TOTAL, JOBS_IN_PROGRESS, JOBS_TOTAL, JOB_DURATION,
    REGISTRY,
};
