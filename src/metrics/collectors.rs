//! High-level recording interface over the raw Prometheus metrics.

use super::prometheus::{
    ACTIVE_WORKERS, CLUSTER_PROVISIONS_TOTAL, JOBS_IN_PROGRESS, JOBS_TOTAL, JOB_DURATION,
};

/// Records benchmark metrics with consistent labels.
///
/// Every method silently does nothing when metrics were never initialized.
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    /// Record a finished job.
    ///
    /// # Arguments
    ///
    /// * `outcome` - `success`, `fail` or `error`
    /// * `model` - Model identifier of the agent configuration
    /// * `duration_secs` - Wall-clock duration of the job
    pub fn record_job(&self, outcome: &str, model: &str, duration_secs: f64) {
        if let Some(jobs_total) = JOBS_TOTAL.get() {
            jobs_total.with_label_values(&[outcome, model]).inc();
        }

        if let Some(job_duration) = JOB_DURATION.get() {
            job_duration
                .with_label_values(&[outcome])
                .observe(duration_secs);
        }

        tracing::trace!(
            outcome = outcome,
            model = model,
            duration_secs = duration_secs,
            "Recorded job metric"
        );
    }

    /// Record one cluster provisioning attempt.
    pub fn record_provision(&self, backend: &str, status: &str) {
        if let Some(provisions) = CLUSTER_PROVISIONS_TOTAL.get() {
            provisions.with_label_values(&[backend, status]).inc();
        }
    }

    pub fn job_started(&self) {
        if let Some(gauge) = JOBS_IN_PROGRESS.get() {
            gauge.inc();
        }
    }

    pub fn job_finished(&self) {
        if let Some(gauge) = JOBS_IN_PROGRESS.get() {
            gauge.dec();
        }
    }

    pub fn worker_started(&self) {
        if let Some(gauge) = ACTIVE_WORKERS.get() {
            gauge.inc();
        }
    }

    pub fn worker_stopped(&self) {
        if let Some(gauge) = ACTIVE_WORKERS.get() {
            gauge.dec();
        }
    }
}
