//! Prometheus metrics registration and export.

use prometheus::{CounterVec, Encoder, Gauge, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::{Mutex, OnceLock};

/// Global Prometheus registry for all benchmark metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Completed jobs, labeled by outcome and model.
pub static JOBS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Job wall-clock duration in seconds, labeled by outcome.
pub static JOB_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Jobs currently executing.
pub static JOBS_IN_PROGRESS: OnceLock<Gauge> = OnceLock::new();

/// Workers currently alive in the pool.
pub static ACTIVE_WORKERS: OnceLock<Gauge> = OnceLock::new();

/// Cluster provisioning attempts, labeled by backend and status.
pub static CLUSTER_PROVISIONS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Serializes initialization so every metric lands in the exported registry.
static INIT_LOCK: Mutex<()> = Mutex::new(());

/// Initialize all metrics and register them with the registry.
///
/// Calling this more than once keeps the first registry.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric construction or registration fails.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let _guard = INIT_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if REGISTRY.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    let jobs_total = CounterVec::new(
        Opts::new("kube_bench_jobs_total", "Total number of completed jobs"),
        &["outcome", "model"],
    )?;

    let job_duration = HistogramVec::new(
        prometheus::HistogramOpts::new(
            "kube_bench_job_duration_seconds",
            "Job execution duration in seconds",
        )
        .buckets(vec![10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0]),
        &["outcome"],
    )?;

    let jobs_in_progress = Gauge::new(
        "kube_bench_jobs_in_progress",
        "Number of jobs currently being executed",
    )?;

    let active_workers = Gauge::new("kube_bench_active_workers", "Number of active workers")?;

    let cluster_provisions_total = CounterVec::new(
        Opts::new(
            "kube_bench_cluster_provisions_total",
            "Cluster provisioning attempts",
        ),
        &["backend", "status"],
    )?;

    registry.register(Box::new(jobs_total.clone()))?;
    registry.register(Box::new(job_duration.clone()))?;
    registry.register(Box::new(jobs_in_progress.clone()))?;
    registry.register(Box::new(active_workers.clone()))?;
    registry.register(Box::new(cluster_provisions_total.clone()))?;

    // The registry goes last: once it is visible, every metric is too.
    let _ = JOBS_TOTAL.set(jobs_total);
    let _ = JOB_DURATION.set(job_duration);
    let _ = JOBS_IN_PROGRESS.set(jobs_in_progress);
    let _ = ACTIVE_WORKERS.set(active_workers);
    let _ = CLUSTER_PROVISIONS_TOTAL.set(cluster_provisions_total);
    let _ = REGISTRY.set(registry);

    tracing::debug!("Prometheus metrics initialized");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}
