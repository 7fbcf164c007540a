//! Agent configurations and the agent binary's invocation contract.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// One evaluated agent backend/model combination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Stable identifier, used for output directory names.
    pub id: String,
    /// LLM provider passed to the agent (`gemini`, `openai`, ...).
    pub provider_id: String,
    pub model_id: String,
    #[serde(default)]
    pub enable_tool_use_shim: bool,
    #[serde(default = "default_quiet")]
    pub quiet: bool,
    /// Run the agent as an MCP client.
    #[serde(default)]
    pub mcp_client: bool,
}

fn default_quiet() -> bool {
    true
}

impl AgentConfig {
    /// Creates a quiet configuration without the tool-use shim.
    pub fn new(provider_id: impl Into<String>, model_id: impl Into<String>) -> Self {
        let provider_id = provider_id.into();
        let model_id = model_id.into();
        let id = config_id(&provider_id, &model_id, false);
        Self {
            id,
            provider_id,
            model_id,
            enable_tool_use_shim: false,
            quiet: true,
            mcp_client: false,
        }
    }

    pub fn with_tool_use_shim(mut self, enabled: bool) -> Self {
        self.enable_tool_use_shim = enabled;
        self.id = config_id(&self.provider_id, &self.model_id, enabled);
        self
    }

    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn with_mcp_client(mut self, enabled: bool) -> Self {
        self.mcp_client = enabled;
        self
    }

    /// Builds one configuration per model for the same provider.
    pub fn for_models<S: AsRef<str>>(
        provider_id: &str,
        models: &[S],
        enable_tool_use_shim: bool,
        quiet: bool,
        mcp_client: bool,
    ) -> Vec<Self> {
        let mut seen = HashSet::new();
        models
            .iter()
            .map(|m| m.as_ref().trim())
            .filter(|m| !m.is_empty())
            // Repeated models would share a job directory.
            .filter(|m| seen.insert(*m))
            .map(|m| {
                Self::new(provider_id, m)
                    .with_tool_use_shim(enable_tool_use_shim)
                    .with_quiet(quiet)
                    .with_mcp_client(mcp_client)
            })
            .collect()
    }

    /// Command-line flags passed to the agent binary.
    pub fn agent_args(&self, kubeconfig: &Path, trace_path: &Path) -> Vec<String> {
        let mut args = vec![
            "--kubeconfig".to_string(),
            kubeconfig.to_string_lossy().to_string(),
            "--llm-provider".to_string(),
            self.provider_id.clone(),
            format!("--enable-tool-use-shim={}", self.enable_tool_use_shim),
            format!("--quiet={}", self.quiet),
            "--model".to_string(),
            self.model_id.clone(),
            "--trace-path".to_string(),
            trace_path.to_string_lossy().to_string(),
            "--skip-permissions".to_string(),
            "--show-tool-output".to_string(),
        ];
        if self.mcp_client {
            args.push("--mcp-client".to_string());
        }
        args
    }
}

/// Derives a filesystem-safe configuration identifier.
fn config_id(provider_id: &str, model_id: &str, shim: bool) -> String {
    let raw = format!(
        "{}-{}-shim_{}",
        provider_id,
        model_id,
        if shim { "enabled" } else { "disabled" }
    );
    raw.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | ' ' => '_',
            c => c,
        })
        .collect()
}
