//! Ephemeral Kubernetes cluster providers.
//!
//! Every backend implements the same four-operation lifecycle contract
//! ([`ClusterProvider`]): check existence, create, delete, and fetch a
//! kubeconfig. Backends are selected through the closed [`ProviderKind`]
//! enum and built by [`create_provider`].
//!
//! # Lifecycle
//!
//! ```text
//! exists? ──no──▶ create (≤3 attempts, 5s apart) ──▶ kubeconfig ──▶ ... ──▶ delete
//! ```
//!
//! # Example
//!
//! ```ignore
//! use kube_agent_bench::cluster::{create_provider, ProviderKind, ProviderSettings};
//!
//! let provider = create_provider(ProviderKind::Kind, &ProviderSettings::default());
//! provider.create("k8s-bench-demo").await?;
//! let kubeconfig = provider.kubeconfig("k8s-bench-demo").await?;
//! provider.delete("k8s-bench-demo").await?;
//! ```

pub mod kind;
pub mod teardown;
pub mod vcluster;

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::ClusterError;
use crate::metrics::MetricsCollector;

pub use kind::KindProvider;
pub use teardown::{Teardown, TeardownStack};
pub use vcluster::VclusterProvider;

/// Number of provisioning attempts before giving up.
pub const MAX_CREATE_ATTEMPTS: u32 = 3;

/// Fixed delay between provisioning attempts.
pub const CREATE_RETRY_BACKOFF: Duration = Duration::from_secs(5);

/// Retry behaviour for [`ClusterProvider::create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_CREATE_ATTEMPTS,
            backoff: CREATE_RETRY_BACKOFF,
        }
    }
}

/// Capability contract shared by all cluster backends.
#[async_trait]
pub trait ClusterProvider: Send + Sync {
    /// Which backend this is.
    fn kind(&self) -> ProviderKind;

    /// Returns true iff a cluster with this name is registered with the backend.
    async fn exists(&self, name: &str) -> Result<bool, ClusterError>;

    /// A single provisioning attempt. Callers should use [`ClusterProvider::create`].
    async fn try_create(&self, name: &str) -> Result<(), ClusterError>;

    /// Tears the cluster down.
    async fn delete(&self, name: &str) -> Result<(), ClusterError>;

    /// Returns kubeconfig bytes addressing the cluster's control plane.
    async fn kubeconfig(&self, name: &str) -> Result<Vec<u8>, ClusterError>;

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
    }

    /// Provisions a cluster, retrying transient failures with a fixed backoff.
    async fn create(&self, name: &str) -> Result<(), ClusterError> {
        let policy = self.retry_policy();
        let backend = self.kind().to_string();
        let metrics = MetricsCollector::new();
        let mut last_error = None;

        for attempt in 1..=policy.max_attempts {
            if attempt > 1 {
                info!(cluster = %name, attempt, "Retrying cluster creation");
                tokio::time::sleep(policy.backoff).await;
            }

            match self.try_create(name).await {
                Ok(()) => {
                    metrics.record_provision(&backend, "success");
                    return Ok(());
                }
                Err(e) => {
                    metrics.record_provision(&backend, "failure");
                    warn!(
                        cluster = %name,
                        attempt,
                        max_attempts = policy.max_attempts,
                        error = %e,
                        "Cluster creation failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        let source = last_error.unwrap_or_else(|| ClusterError::Command {
            command: "create".to_string(),
            message: "no attempts were made".to_string(),
        });
        Err(ClusterError::Provisioning {
            name: name.to_string(),
            attempts: policy.max_attempts,
            source: Box::new(source),
        })
    }
}

/// Supported cluster backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Local single-node cluster via `kind`.
    #[default]
    Kind,
    /// Virtual cluster hosted inside another cluster via `vcluster`.
    Vcluster,
}

impl ProviderKind {
    /// Backends whose clusters are cheap enough to create per task force
    /// per-task isolation for every job.
    pub fn forces_isolation(&self) -> bool {
        matches!(self, ProviderKind::Vcluster)
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Kind => write!(f, "kind"),
            ProviderKind::Vcluster => write!(f, "vcluster"),
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "kind" => Ok(ProviderKind::Kind),
            "vcluster" => Ok(ProviderKind::Vcluster),
            other => Err(ClusterError::UnknownProvider(other.to_string())),
        }
    }
}

/// Backend settings that only some providers use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// kubectl context of the host cluster (vcluster).
    pub host_context: Option<String>,
    /// Kubeconfig of the host cluster (vcluster).
    pub host_kubeconfig: Option<PathBuf>,
    /// External IP of the host's ingress controller; enables ingress mode (vcluster).
    pub ingress_external_ip: Option<String>,
    /// Wait applied after fetching credentials when the background proxy is used (vcluster).
    pub proxy_ready_delay: Duration,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            host_context: None,
            host_kubeconfig: None,
            ingress_external_ip: None,
            proxy_ready_delay: vcluster::DEFAULT_PROXY_READY_DELAY,
        }
    }
}

/// Builds the provider for `kind`.
pub fn create_provider(kind: ProviderKind, settings: &ProviderSettings) -> Arc<dyn ClusterProvider> {
    match kind {
        ProviderKind::Kind => Arc::new(KindProvider::new()),
        ProviderKind::Vcluster => Arc::new(
            VclusterProvider::new(
                settings.host_context.clone(),
                settings.host_kubeconfig.clone(),
                settings.ingress_external_ip.clone(),
            )
            .with_proxy_ready_delay(settings.proxy_ready_delay),
        ),
    }
}

/// Runs a backend CLI command and returns its stdout.
///
/// `env` is applied to this invocation only. A non-zero exit becomes
/// [`ClusterError::Command`] carrying the trimmed stderr.
pub(crate) async fn run_cli(
    program: &str,
    args: &[String],
    env: &[(String, String)],
    stdin: Option<&str>,
) -> Result<Vec<u8>, ClusterError> {
    let cmdline = format!("{} {}", program, args.join(" "));
    debug!(command = %cmdline, "Running backend command");

    let mut cmd = Command::new(program);
    cmd.args(args)
        .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| ClusterError::Command {
        command: cmdline.clone(),
        message: format!("failed to spawn: {}", e),
    })?;

    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(input.as_bytes()).await?;
        pipe.shutdown().await?;
    }

    let output = child.wait_with_output().await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(ClusterError::Command {
            command: cmdline,
            message: format!("{}: {}", output.status, stderr),
        });
    }
    Ok(output.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails `failures` times before succeeding.
    struct FlakyProvider {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ClusterProvider for FlakyProvider {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Kind
        }

        async fn exists(&self, _name: &str) -> Result<bool, ClusterError> {
            Ok(false)
        }

        async fn try_create(&self, _name: &str) -> Result<(), ClusterError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                Err(ClusterError::Command {
                    command: "kind create cluster".to_string(),
                    message: format!("attempt {} failed", call),
                })
            } else {
                Ok(())
            }
        }

        async fn delete(&self, _name: &str) -> Result<(), ClusterError> {
            Ok(())
        }

        async fn kubeconfig(&self, _name: &str) -> Result<Vec<u8>, ClusterError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_succeeds_on_third_attempt() {
        let provider = FlakyProvider {
            failures: 2,
            calls: AtomicU32::new(0),
        };
        let start = tokio::time::Instant::now();

        provider.create("flaky").await.unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), CREATE_RETRY_BACKOFF * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_gives_up_after_max_attempts() {
        let provider = FlakyProvider {
            failures: 10,
            calls: AtomicU32::new(0),
        };

        let err = provider.create("doomed").await.unwrap_err();

        assert_eq!(provider.calls.load(Ordering::SeqCst), MAX_CREATE_ATTEMPTS);
        match err {
            ClusterError::Provisioning {
                name,
                attempts,
                source,
            } => {
                assert_eq!(name, "doomed");
                assert_eq!(attempts, 3);
                assert!(source.to_string().contains("attempt 3 failed"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_create_first_try_has_no_delay() {
        let provider = FlakyProvider {
            failures: 0,
            calls: AtomicU32::new(0),
        };
        provider.create("fast").await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_provider_kind_parse() {
        assert_eq!("kind".parse::<ProviderKind>().unwrap(), ProviderKind::Kind);
        assert_eq!(
            "VCluster".parse::<ProviderKind>().unwrap(),
            ProviderKind::Vcluster
        );
        assert!("minikube".parse::<ProviderKind>().is_err());
        assert_eq!(ProviderKind::Vcluster.to_string(), "vcluster");
    }

    #[test]
    fn test_factory_returns_matching_backend() {
        let settings = ProviderSettings::default();
        assert_eq!(
            create_provider(ProviderKind::Kind, &settings).kind(),
            ProviderKind::Kind
        );
        assert_eq!(
            create_provider(ProviderKind::Vcluster, &settings).kind(),
            ProviderKind::Vcluster
        );
        assert!(ProviderKind::Vcluster.forces_isolation());
        assert!(!ProviderKind::Kind.forces_isolation());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_cli_reports_stderr() {
        let args = vec!["-c".to_string(), "echo boom >&2; exit 3".to_string()];
        let err = run_cli("sh", &args, &[], None).await.unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_cli_passes_env_and_stdin() {
        let args = vec!["-c".to_string(), "printf '%s:' \"$KUBECONFIG\"; cat".to_string()];
        let env = vec![("KUBECONFIG".to_string(), "/tmp/kc".to_string())];
        let out = run_cli("sh", &args, &env, Some("hello")).await.unwrap();
        assert_eq!(String::from_utf8_lossy(&out), "/tmp/kc:hello");
    }
}
