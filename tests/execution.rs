//! End-to-end tests of the per-job state machine using shell-script agents.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use kube_agent_bench::cluster::{ClusterProvider, ProviderKind};
use kube_agent_bench::error::ClusterError;
use kube_agent_bench::runner::{AgentConfig, JobContext, Outcome, TaskExecutor, TaskLog};
use kube_agent_bench::task::{IsolationMode, ScriptStep, Task};

/// In-memory backend that records lifecycle calls.
struct FakeProvider {
    kind: ProviderKind,
    fail_delete: bool,
    fail_kubeconfig: bool,
    created: Mutex<Vec<String>>,
    deleted: Mutex<Vec<String>>,
}

impl FakeProvider {
    fn new() -> Self {
        Self {
            kind: ProviderKind::Kind,
            fail_delete: false,
            fail_kubeconfig: false,
            created: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
        }
    }

    fn failing_delete() -> Self {
        Self {
            fail_delete: true,
            ..Self::new()
        }
    }
}

#[async_trait]
impl ClusterProvider for FakeProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn exists(&self, name: &str) -> Result<bool, ClusterError> {
        Ok(self.created.lock().unwrap().iter().any(|n| n == name))
    }

    async fn try_create(&self, name: &str) -> Result<(), ClusterError> {
        self.created.lock().unwrap().push(name.to_string());
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), ClusterError> {
        self.deleted.lock().unwrap().push(name.to_string());
        if self.fail_delete {
            return Err(ClusterError::Command {
                command: format!("kind delete cluster --name {}", name),
                message: "exit status 1".to_string(),
            });
        }
        Ok(())
    }

    async fn kubeconfig(&self, name: &str) -> Result<Vec<u8>, ClusterError> {
        if self.fail_kubeconfig {
            return Err(ClusterError::Command {
                command: format!("kind get kubeconfig --name {}", name),
                message: "exit status 1".to_string(),
            });
        }
        Ok(format!("# fake-cluster {}\n", name).into_bytes())
    }
}

struct Fixture {
    _root: TempDir,
    task_dir: PathBuf,
    job_dir: PathBuf,
    agent: PathBuf,
    log: TaskLog,
}

impl Fixture {
    fn new(agent_body: &str) -> Self {
        let root = TempDir::new().unwrap();
        let task_dir = root.path().join("task");
        let job_dir = root.path().join("job");
        std::fs::create_dir_all(&task_dir).unwrap();
        std::fs::create_dir_all(&job_dir).unwrap();
        let agent = write_script(root.path(), "agent.sh", agent_body);
        let log = TaskLog::create(&job_dir.join("log.txt")).unwrap();
        Self {
            _root: root,
            task_dir,
            job_dir,
            agent,
            log,
        }
    }

    fn script(&self, name: &str, body: &str) {
        write_script(&self.task_dir, name, body);
    }

    fn task(&self) -> Task {
        Task::new("scale-deployment", &self.task_dir).with_prompt("Scale the web deployment to 3 replicas")
    }

    fn ctx(&self) -> JobContext {
        JobContext {
            job_dir: self.job_dir.clone(),
            log: self.log.clone(),
            kubeconfig: PathBuf::from("/tmp/shared-kubeconfig.yaml"),
        }
    }

    async fn run(&self, task: &Task, provider: Arc<dyn ClusterProvider>) -> kube_agent_bench::runner::TaskResult {
        let executor = TaskExecutor::new(&self.agent, provider);
        executor
            .execute(task, &AgentConfig::new("gemini", "flash"), 0, &self.ctx())
            .await
    }
}

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[tokio::test]
async fn test_timeout_yields_single_failure() {
    let fx = Fixture::new("sleep 5");
    let task = fx
        .task()
        .with_expectation("anything")
        .with_timeout(Duration::from_secs(1));

    let started = std::time::Instant::now();
    let result = fx.run(&task, Arc::new(FakeProvider::new())).await;

    assert_eq!(result.result, Outcome::Fail);
    assert_eq!(result.failures.len(), 1);
    assert!(result.failures[0].message.contains("timed out"));
    assert!(result.error.is_none());
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn test_matching_expectation_succeeds() {
    let fx = Fixture::new(
        "cat > /dev/null\necho 'Running: kubectl scale deployment web --replicas=3'\necho 'Scaled deployment to 3 replicas'",
    );
    let task = fx.task().with_expectation("Scaled.*to 3");

    let result = fx.run(&task, Arc::new(FakeProvider::new())).await;

    assert_eq!(result.result, Outcome::Success);
    assert!(result.failures.is_empty());
    let log = std::fs::read_to_string(fx.job_dir.join("log.txt")).unwrap();
    assert!(log.contains("Scaled deployment to 3 replicas"));
}

#[tokio::test]
async fn test_unmatched_expectation_fails() {
    let fx = Fixture::new("echo 'Running: kubectl get pods'\necho 'No resources found'");
    let task = fx.task().with_expectation("Scaled.*to 3");

    let result = fx.run(&task, Arc::new(FakeProvider::new())).await;

    assert_eq!(result.result, Outcome::Fail);
    assert_eq!(result.failures.len(), 1);
    assert!(result.failures[0].message.contains("did not match"));
}

#[tokio::test]
async fn test_no_success_criteria_always_fails() {
    let fx = Fixture::new("echo 'Running: kubectl scale'\necho 'Scaled deployment to 3 replicas'");
    let task = fx.task();

    let result = fx.run(&task, Arc::new(FakeProvider::new())).await;

    assert_eq!(result.result, Outcome::Fail);
    assert!(result.error.is_none());
}

#[tokio::test]
async fn test_prompts_are_streamed_on_stdin() {
    let fx = Fixture::new("cat");
    std::fs::write(fx.task_dir.join("followup.md"), "Then expose it on port 80\n").unwrap();
    let mut task = fx.task().with_expectation("(?s)3 replicas.*port 80");
    task.script.push(ScriptStep::file("followup.md"));

    let result = fx.run(&task, Arc::new(FakeProvider::new())).await;

    assert_eq!(result.result, Outcome::Success, "{:?}", result);
}

#[tokio::test]
async fn test_missing_prompt_file_is_error() {
    let fx = Fixture::new("cat");
    let mut task = fx.task().with_expectation("x");
    task.script.push(ScriptStep::file("missing.md"));

    let result = fx.run(&task, Arc::new(FakeProvider::new())).await;

    assert_eq!(result.result, Outcome::Error);
    assert!(result.error.unwrap().contains("missing.md"));
}

#[tokio::test]
async fn test_verifier_sees_shared_kubeconfig() {
    let fx = Fixture::new("true");
    fx.script(
        "verify.sh",
        "test \"$KUBECONFIG\" = /tmp/shared-kubeconfig.yaml",
    );
    let task = fx.task().with_verifier("verify.sh");

    let result = fx.run(&task, Arc::new(FakeProvider::new())).await;

    assert_eq!(result.result, Outcome::Success, "{:?}", result);
}

#[tokio::test]
async fn test_failing_verifier_attaches_log() {
    let fx = Fixture::new("echo agent-was-here");
    fx.script("verify.sh", "echo 'deployment web has 1 replica'\nexit 1");
    let task = fx.task().with_verifier("verify.sh");

    let result = fx.run(&task, Arc::new(FakeProvider::new())).await;

    assert_eq!(result.result, Outcome::Fail);
    assert_eq!(result.failures.len(), 1);
    let message = &result.failures[0].message;
    assert!(message.starts_with("verifier script failed"));
    assert!(message.contains("---LOG---"));
    assert!(message.contains("deployment web has 1 replica"));
}

#[tokio::test]
async fn test_setup_failure_skips_agent() {
    let fx = Fixture::new("touch \"$(dirname \"$0\")/agent-ran\"");
    fx.script("setup.sh", "echo 'cannot reach cluster' >&2\nexit 2");
    let task = fx.task().with_setup("setup.sh").with_expectation("x");

    let result = fx.run(&task, Arc::new(FakeProvider::new())).await;

    assert_eq!(result.result, Outcome::Error);
    let error = result.error.unwrap();
    assert!(error.starts_with("Setup failed"));
    assert!(error.contains("cannot reach cluster"));
    assert!(!fx.agent.with_file_name("agent-ran").exists());
}

#[tokio::test]
async fn test_cleanup_runs_after_agent_error() {
    let fx = Fixture::new("echo 'connecting'\necho 'fatal: no credentials' >&2\nexit 1");
    fx.script("cleanup.sh", "touch cleaned-up");
    let task = fx
        .task()
        .with_cleanup("cleanup.sh")
        .with_expectation("x")
        .with_isolation(IsolationMode::PerTaskCluster);
    let provider = Arc::new(FakeProvider::failing_delete());

    let result = fx.run(&task, provider.clone()).await;

    assert_eq!(result.result, Outcome::Error);
    let error = result.error.unwrap();
    assert!(error.starts_with("agent encountered error"));
    assert!(error.contains("fatal: no credentials"));

    let created = provider.created.lock().unwrap().clone();
    let deleted = provider.deleted.lock().unwrap().clone();
    assert_eq!(created.len(), 1);
    assert!(created[0].starts_with("k8s-bench-scale-deployment-"));
    assert_eq!(deleted, created);
    assert!(fx.task_dir.join("cleaned-up").exists());
    assert!(!fx.job_dir.join("kubeconfig.yaml").exists());
}

#[tokio::test]
async fn test_teardown_failure_keeps_success() {
    let fx = Fixture::new("echo 'Running: kubectl scale'\necho 'Scaled deployment to 3 replicas'");
    fx.script("verify.sh", "grep -q fake-cluster \"$KUBECONFIG\"");
    let task = fx
        .task()
        .with_verifier("verify.sh")
        .with_isolation(IsolationMode::PerTaskCluster);
    let provider = Arc::new(FakeProvider::failing_delete());

    let result = fx.run(&task, provider.clone()).await;

    assert_eq!(result.result, Outcome::Success, "{:?}", result);
    assert_eq!(provider.deleted.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_vcluster_forces_isolation() {
    let fx = Fixture::new("true");
    let task = fx.task().with_expectation(".*");
    let provider = Arc::new(FakeProvider {
        kind: ProviderKind::Vcluster,
        ..FakeProvider::new()
    });

    let result = fx.run(&task, provider.clone()).await;

    assert_eq!(result.result, Outcome::Success);
    assert_eq!(provider.created.lock().unwrap().len(), 1);
    assert_eq!(provider.deleted.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_failed_provisioning_keeps_cleanup_off_shared_cluster() {
    let fx = Fixture::new("true");
    fx.script("cleanup.sh", "echo \"$KUBECONFIG\" > cleanup-kubeconfig");
    let task = fx
        .task()
        .with_cleanup("cleanup.sh")
        .with_expectation(".*")
        .with_isolation(IsolationMode::PerTaskCluster);
    let provider = Arc::new(FakeProvider {
        fail_kubeconfig: true,
        ..FakeProvider::new()
    });

    let result = fx.run(&task, provider.clone()).await;

    assert_eq!(result.result, Outcome::Error);
    assert!(result.error.unwrap().contains("Failed to create isolated cluster"));
    let seen = std::fs::read_to_string(fx.task_dir.join("cleanup-kubeconfig")).unwrap();
    assert_eq!(seen.trim(), fx.job_dir.join("kubeconfig.yaml").to_string_lossy());
    assert_eq!(provider.deleted.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_non_utf8_agent_output_does_not_truncate_transcript() {
    let fx = Fixture::new(
        "printf 'caf\\351 latin1\\n'\necho 'Running: kubectl scale'\necho 'Scaled deployment to 3 replicas'",
    );
    let task = fx.task().with_expectation("Scaled.*to 3");

    let result = fx.run(&task, Arc::new(FakeProvider::new())).await;

    assert_eq!(result.result, Outcome::Success, "{:?}", result);
    let log = std::fs::read_to_string(fx.job_dir.join("log.txt")).unwrap();
    assert!(log.contains("Scaled deployment to 3 replicas"));
}
