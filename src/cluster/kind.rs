//! `kind` backend: a local single-node cluster running in Docker.

use async_trait::async_trait;
use tracing::info;

use super::{run_cli, ClusterProvider, ProviderKind};
use crate::error::ClusterError;

const KIND_BIN: &str = "kind";

/// How long `kind create cluster` waits for the control plane.
const CONTROL_PLANE_WAIT: &str = "5m";

#[derive(Debug, Clone, Default)]
pub struct KindProvider {
    /// Path or name of the `kind` executable.
    binary: String,
}

impl KindProvider {
    pub fn new() -> Self {
        Self {
            binary: KIND_BIN.to_string(),
        }
    }

    /// Uses a different `kind` executable.
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

/// Parses the output of `kind get clusters`.
fn cluster_listed(output: &str, name: &str) -> bool {
    output.lines().any(|line| line.trim() == name)
}

#[async_trait]
impl ClusterProvider for KindProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Kind
    }

    async fn exists(&self, name: &str) -> Result<bool, ClusterError> {
        let args = vec!["get".to_string(), "clusters".to_string()];
        let output = run_cli(&self.binary, &args, &[], None)
            .await
            .map_err(|e| ClusterError::BackendQuery {
                backend: "kind".to_string(),
                message: e.to_string(),
            })?;
        Ok(cluster_listed(&String::from_utf8_lossy(&output), name))
    }

    async fn try_create(&self, name: &str) -> Result<(), ClusterError> {
        info!(cluster = %name, "Creating kind cluster");
        let args = vec![
            "create".to_string(),
            "cluster".to_string(),
            "--name".to_string(),
            name.to_string(),
            "--wait".to_string(),
            CONTROL_PLANE_WAIT.to_string(),
        ];
        run_cli(&self.binary, &args, &[], None).await.map(|_| ())
    }

    async fn delete(&self, name: &str) -> Result<(), ClusterError> {
        info!(cluster = %name, "Deleting kind cluster");
        let args = vec![
            "delete".to_string(),
            "cluster".to_string(),
            "--name".to_string(),
            name.to_string(),
        ];
        run_cli(&self.binary, &args, &[], None).await.map(|_| ())
    }

    async fn kubeconfig(&self, name: &str) -> Result<Vec<u8>, ClusterError> {
        let args = vec![
            "get".to_string(),
            "kubeconfig".to_string(),
            "--name".to_string(),
            name.to_string(),
        ];
        run_cli(&self.binary, &args, &[], None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_listed() {
        let output = "kind\nk8s-bench-eval\nother\n";
        assert!(cluster_listed(output, "k8s-bench-eval"));
        assert!(!cluster_listed(output, "k8s-bench"));
        assert!(!cluster_listed("", "kind"));
    }

    #[tokio::test]
    async fn test_exists_maps_missing_binary_to_backend_query() {
        let provider = KindProvider::with_binary("/nonexistent/kind-binary");
        let err = provider.exists("x").await.unwrap_err();
        assert!(matches!(err, ClusterError::BackendQuery { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exists_with_stub_binary() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let stub = dir.path().join("kind");
        std::fs::write(&stub, "#!/bin/sh\necho alpha\necho k8s-bench-eval\n").unwrap();
        std::fs::set_permissions(&stub, std::fs::Permissions::from_mode(0o755)).unwrap();

        let provider = KindProvider::with_binary(stub.to_string_lossy());
        assert!(provider.exists("k8s-bench-eval").await.unwrap());
        assert!(!provider.exists("beta").await.unwrap());
    }
}
