//! `vcluster` backend: virtual clusters hosted in a namespace of a host cluster.
//!
//! Two connection modes are supported:
//!
//! - **Proxy** (default): `vcluster connect --print` returns a kubeconfig that
//!   points at a local background proxy, which needs a fixed delay before it
//!   accepts connections.
//! - **Ingress**: when an ingress external IP is configured, each virtual
//!   cluster is exposed through an SSL-passthrough nginx ingress at
//!   `https://<name>.<ip>.nip.io` and no wait is needed.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use super::{run_cli, ClusterProvider, ProviderKind};
use crate::error::ClusterError;

const VCLUSTER_BIN: &str = "vcluster";
const KUBECTL_BIN: &str = "kubectl";

/// Wait for the local background proxy after fetching credentials.
pub const DEFAULT_PROXY_READY_DELAY: Duration = Duration::from_secs(60);

const BASE_VALUES: &str = "sync:
  toHost:
    persistentVolumeClaims:
      enabled: true
    persistentVolumes:
      enabled: true
    storageClasses:
      enabled: true
";

#[derive(Debug, Clone)]
pub struct VclusterProvider {
    host_context: Option<String>,
    host_kubeconfig: Option<PathBuf>,
    ingress_external_ip: Option<String>,
    proxy_ready_delay: Duration,
}

#[derive(Debug, Deserialize)]
struct ListedCluster {
    #[serde(rename = "Name")]
    name: String,
}

impl VclusterProvider {
    pub fn new(
        host_context: Option<String>,
        host_kubeconfig: Option<PathBuf>,
        ingress_external_ip: Option<String>,
    ) -> Self {
        Self {
            host_context: host_context.filter(|s| !s.is_empty()),
            host_kubeconfig,
            ingress_external_ip: ingress_external_ip.filter(|s| !s.is_empty()),
            proxy_ready_delay: DEFAULT_PROXY_READY_DELAY,
        }
    }

    pub fn with_proxy_ready_delay(mut self, delay: Duration) -> Self {
        self.proxy_ready_delay = delay;
        self
    }

    pub fn uses_ingress(&self) -> bool {
        self.ingress_external_ip.is_some()
    }

    fn ingress_host(&self, name: &str) -> Option<String> {
        self.ingress_external_ip
            .as_ref()
            .map(|ip| format!("{}.{}.nip.io", name, ip))
    }

    /// `KUBECONFIG` for commands addressed at the host cluster.
    fn host_env(&self) -> Vec<(String, String)> {
        self.host_kubeconfig
            .iter()
            .map(|p| ("KUBECONFIG".to_string(), p.to_string_lossy().to_string()))
            .collect()
    }

    fn push_context(&self, args: &mut Vec<String>) {
        if let Some(ref ctx) = self.host_context {
            args.push("--context".to_string());
            args.push(ctx.clone());
        }
    }

    fn values_yaml(&self, name: &str) -> String {
        let mut values = BASE_VALUES.to_string();
        if let Some(host) = self.ingress_host(name) {
            values.push_str(&format!(
                "controlPlane:\n  proxy:\n    extraSANs:\n    - {}\n",
                host
            ));
        }
        values
    }

    fn namespace_manifest(name: &str) -> String {
        format!(
            "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: {}\n",
            namespace_for(name)
        )
    }

    fn ingress_manifest(&self, name: &str) -> Option<String> {
        let host = self.ingress_host(name)?;
        Some(format!(
            r#"apiVersion: networking.k8s.io/v1
kind: Ingress
metadata:
  annotations:
    nginx.ingress.kubernetes.io/backend-protocol: HTTPS
    nginx.ingress.kubernetes.io/ssl-passthrough: "true"
    nginx.ingress.kubernetes.io/ssl-redirect: "true"
  name: {name}
  namespace: {namespace}
spec:
  ingressClassName: nginx
  rules:
  - host: {host}
    http:
      paths:
      - backend:
          service:
            name: {name}
            port:
              number: 443
        path: /
        pathType: ImplementationSpecific
"#,
            name = name,
            namespace = namespace_for(name),
            host = host,
        ))
    }

    async fn apply_manifest(&self, manifest: &str) -> Result<(), ClusterError> {
        let mut args = vec!["apply".to_string(), "-f".to_string(), "-".to_string()];
        self.push_context(&mut args);
        run_cli(KUBECTL_BIN, &args, &self.host_env(), Some(manifest))
            .await
            .map(|_| ())
    }

    /// Ensures the host namespace (and ingress, if enabled) exist.
    async fn prepare_host(&self, name: &str) -> Result<(), ClusterError> {
        self.apply_manifest(&Self::namespace_manifest(name)).await?;
        if let Some(ingress) = self.ingress_manifest(name) {
            self.apply_manifest(&ingress).await?;
        }
        Ok(())
    }
}

fn namespace_for(name: &str) -> String {
    format!("vcluster-{}", name)
}

fn parse_cluster_list(output: &[u8]) -> Result<Vec<String>, serde_json::Error> {
    let clusters: Vec<ListedCluster> = serde_json::from_slice(output)?;
    Ok(clusters.into_iter().map(|c| c.name).collect())
}

#[async_trait]
impl ClusterProvider for VclusterProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Vcluster
    }

    async fn exists(&self, name: &str) -> Result<bool, ClusterError> {
        let mut args = vec![
            "list".to_string(),
            "--output".to_string(),
            "json".to_string(),
        ];
        self.push_context(&mut args);

        let query_error = |message: String| ClusterError::BackendQuery {
            backend: "vcluster".to_string(),
            message,
        };

        let output = run_cli(VCLUSTER_BIN, &args, &self.host_env(), None)
            .await
            .map_err(|e| query_error(e.to_string()))?;
        let names = parse_cluster_list(&output)
            .map_err(|e| query_error(format!("failed to parse vcluster list json: {}", e)))?;
        Ok(names.iter().any(|n| n == name))
    }

    async fn try_create(&self, name: &str) -> Result<(), ClusterError> {
        self.prepare_host(name).await?;

        let mut values_file = tempfile::Builder::new()
            .prefix("vcluster-values-")
            .suffix(".yaml")
            .tempfile()?;
        values_file.write_all(self.values_yaml(name).as_bytes())?;
        values_file.flush()?;

        let mut args = vec![
            "create".to_string(),
            name.to_string(),
            "--connect=false".to_string(),
        ];
        self.push_context(&mut args);
        args.push("--values".to_string());
        args.push(values_file.path().to_string_lossy().to_string());

        info!(cluster = %name, ingress = self.uses_ingress(), "Creating vcluster");
        run_cli(VCLUSTER_BIN, &args, &self.host_env(), None)
            .await
            .map(|_| ())
    }

    async fn delete(&self, name: &str) -> Result<(), ClusterError> {
        let mut args = vec!["delete".to_string(), name.to_string()];
        self.push_context(&mut args);
        args.push("--delete-namespace".to_string());

        info!(cluster = %name, "Deleting vcluster");
        run_cli(VCLUSTER_BIN, &args, &self.host_env(), None)
            .await
            .map(|_| ())
    }

    async fn kubeconfig(&self, name: &str) -> Result<Vec<u8>, ClusterError> {
        let mut args = vec!["connect".to_string(), name.to_string(), "--print".to_string()];
        self.push_context(&mut args);
        if let Some(host) = self.ingress_host(name) {
            args.push("--server".to_string());
            args.push(format!("https://{}", host));
        }

        let config = run_cli(VCLUSTER_BIN, &args, &self.host_env(), None).await?;

        if !self.uses_ingress() {
            debug!(
                cluster = %name,
                delay_secs = self.proxy_ready_delay.as_secs(),
                "Waiting for background proxy"
            );
            tokio::time::sleep(self.proxy_ready_delay).await;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ingress_provider() -> VclusterProvider {
        VclusterProvider::new(
            Some("host-ctx".to_string()),
            Some(PathBuf::from("/etc/host.kubeconfig")),
            Some("34.1.2.3".to_string()),
        )
    }

    #[test]
    fn test_empty_settings_are_ignored() {
        let provider = VclusterProvider::new(Some(String::new()), None, Some(String::new()));
        assert!(!provider.uses_ingress());
        let mut args = Vec::new();
        provider.push_context(&mut args);
        assert!(args.is_empty());
        assert!(provider.host_env().is_empty());
    }

    #[test]
    fn test_values_include_san_only_with_ingress() {
        let plain = VclusterProvider::new(None, None, None);
        assert!(!plain.values_yaml("a").contains("extraSANs"));

        let values = ingress_provider().values_yaml("task-a");
        assert!(values.starts_with("sync:"));
        assert!(values.contains("- task-a.34.1.2.3.nip.io"));
    }

    #[test]
    fn test_manifests() {
        let ns = VclusterProvider::namespace_manifest("task-a");
        assert!(ns.contains("name: vcluster-task-a"));

        let ingress = ingress_provider().ingress_manifest("task-a").unwrap();
        assert!(ingress.contains("namespace: vcluster-task-a"));
        assert!(ingress.contains("host: task-a.34.1.2.3.nip.io"));
        assert!(VclusterProvider::new(None, None, None)
            .ingress_manifest("task-a")
            .is_none());
    }

    #[test]
    fn test_host_env_and_context() {
        let provider = ingress_provider();
        assert_eq!(
            provider.host_env(),
            vec![(
                "KUBECONFIG".to_string(),
                "/etc/host.kubeconfig".to_string()
            )]
        );
        let mut args = vec!["list".to_string()];
        provider.push_context(&mut args);
        assert_eq!(args, vec!["list", "--context", "host-ctx"]);
    }

    #[test]
    fn test_parse_cluster_list() {
        let json = br#"[{"Name":"k8s-bench-a","Namespace":"vcluster-k8s-bench-a"},{"Name":"b"}]"#;
        assert_eq!(parse_cluster_list(json).unwrap(), vec!["k8s-bench-a", "b"]);
        assert!(parse_cluster_list(b"not json").is_err());
    }
}
