//! Typed teardown actions for per-job resources.

use std::path::PathBuf;

use tracing::{debug, warn};

use super::ClusterProvider;
use crate::error::CleanupError;

/// One resource to release when a job finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Teardown {
    /// Delete a cluster through the job's provider.
    DeleteCluster { name: String },
    /// Remove a file written during the job.
    RemoveFile { path: PathBuf },
}

impl std::fmt::Display for Teardown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Teardown::DeleteCluster { name } => write!(f, "delete cluster {}", name),
            Teardown::RemoveFile { path } => write!(f, "remove file {}", path.display()),
        }
    }
}

/// Teardown actions in registration order, executed in reverse.
#[derive(Debug, Default)]
pub struct TeardownStack {
    actions: Vec<Teardown>,
}

impl TeardownStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: Teardown) {
        debug!(action = %action, "Registered teardown");
        self.actions.push(action);
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn actions(&self) -> &[Teardown] {
        &self.actions
    }

    /// Runs every action, last registered first.
    ///
    /// A failing action does not stop the remaining ones; all failures are
    /// returned together.
    pub async fn run(self, provider: &dyn ClusterProvider) -> Result<(), CleanupError> {
        let mut failures = Vec::new();

        for action in self.actions.into_iter().rev() {
            let outcome = match &action {
                Teardown::DeleteCluster { name } => {
                    provider.delete(name).await.map_err(|e| e.to_string())
                }
                Teardown::RemoveFile { path } => match tokio::fs::remove_file(path).await {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                    Err(e) => Err(e.to_string()),
                },
            };

            if let Err(message) = outcome {
                warn!(action = %action, error = %message, "Teardown action failed");
                failures.push(format!("{}: {}", action, message));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(CleanupError { failures })
        }
    }
}
