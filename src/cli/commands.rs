//! CLI command definitions for kube-agent-bench.
//!
//! Two commands: `run` executes the benchmark and appends trial records,
//! `score` turns record streams into pass@k tables.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use crate::cluster::{ProviderKind, ProviderSettings};
use crate::metrics::{export_metrics, init_metrics};
use crate::runner::{AgentConfig, ClusterCreationPolicy, EvalConfig, OutcomeCounts, TaskResult};
use crate::scheduler::run_evaluation;
use crate::scoring::{read_records, render, score, ReportFormat, TrialRecord};

const DEFAULT_AGENT_BIN: &str = "kubectl-ai";
const DEFAULT_TASKS_DIR: &str = "./tasks";
const DEFAULT_OUTPUT_DIR: &str = "./.build/results";
const DEFAULT_PROVIDER: &str = "gemini";
const DEFAULT_MODELS: &str = "gemini-2.5-pro-preview-03-25";
const METRICS_FILE_NAME: &str = "metrics.prom";

/// Benchmark harness for Kubernetes operations agents.
#[derive(Parser)]
#[command(name = "kube-agent-bench")]
#[command(about = "Evaluate agents on Kubernetes tasks in ephemeral clusters")]
#[command(version)]
#[command(
    long_about = "kube-agent-bench runs an agent binary against a directory of declarative Kubernetes tasks, each in a fresh or shared cluster, and scores repeated trials with pass@k.\n\nExample usage:\n  kube-agent-bench run --agent-bin ./kubectl-ai --models gemini-2.5-pro,gemini-2.5-flash --trials 5\n  kube-agent-bench score ./.build/results"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run every task under every model configuration.
    #[command(alias = "eval")]
    Run(Box<RunArgs>),

    /// Compute pass@k statistics from trial record streams.
    Score(ScoreArgs),
}

/// Arguments for `kube-agent-bench run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Agent executable under evaluation.
    #[arg(long, env = "AGENT_BIN", default_value = DEFAULT_AGENT_BIN)]
    pub agent_bin: PathBuf,

    /// Directory containing one subdirectory per task.
    #[arg(long, default_value = DEFAULT_TASKS_DIR)]
    pub tasks_dir: PathBuf,

    /// Regex selecting which task identifiers to run.
    #[arg(long)]
    pub task_pattern: Option<String>,

    /// Directory for per-job artifacts and the trial record stream.
    #[arg(short = 'o', long, default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: PathBuf,

    /// Number of jobs run in parallel. Non-positive values mean 1.
    #[arg(short = 'c', long, default_value = "1", allow_negative_numbers = true)]
    pub concurrency: i64,

    /// Independent trials per (task, model) pair.
    #[arg(short = 'n', long, default_value = "1")]
    pub trials: usize,

    /// LLM provider passed to the agent.
    #[arg(long, default_value = DEFAULT_PROVIDER)]
    pub llm_provider: String,

    /// Comma-separated list of models to evaluate.
    #[arg(short = 'm', long, default_value = DEFAULT_MODELS)]
    pub models: String,

    /// Enable the agent's tool-use shim.
    #[arg(long)]
    pub enable_tool_use_shim: bool,

    /// Run the agent in quiet mode.
    #[arg(long, default_value = "true", action = clap::ArgAction::Set)]
    pub quiet: bool,

    /// Run the agent as an MCP client.
    #[arg(long)]
    pub mcp_client: bool,

    /// Cluster backend (kind, vcluster).
    #[arg(long, default_value = "kind")]
    pub cluster_provider: ProviderKind,

    /// How to prepare the shared cluster (always-create, create-if-not-exist, do-not-create).
    #[arg(long, default_value = "create-if-not-exist")]
    pub cluster_creation_policy: ClusterCreationPolicy,

    /// Kubeconfig used with --cluster-creation-policy=do-not-create.
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// kubectl context of the vcluster host cluster.
    #[arg(long)]
    pub host_cluster_context: Option<String>,

    /// Kubeconfig of the vcluster host cluster.
    #[arg(long)]
    pub host_cluster_kubeconfig: Option<PathBuf>,

    /// External IP of the host's ingress controller; exposes vclusters through ingress.
    #[arg(long)]
    pub ingress_external_ip: Option<String>,

    /// Wait after fetching vcluster credentials when no ingress is used (e.g. "60s").
    #[arg(long, default_value = "60s", value_parser = humantime::parse_duration)]
    pub proxy_ready_delay: Duration,

    /// Write Prometheus metrics to <output-dir>/metrics.prom when done.
    #[arg(long)]
    pub export_metrics: bool,

    /// Print results as JSON instead of a summary.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `kube-agent-bench score`.
#[derive(Parser, Debug)]
pub struct ScoreArgs {
    /// Record streams (results.jsonl files or output directories containing one).
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Output format (markdown, json).
    #[arg(short = 'f', long, default_value = "markdown")]
    pub format: ReportFormat,

    /// Write the report to a file instead of stdout.
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,
}

impl RunArgs {
    fn agent_configs(&self) -> Vec<AgentConfig> {
        let models: Vec<&str> = self.models.split(',').collect();
        AgentConfig::for_models(
            &self.llm_provider,
            &models,
            self.enable_tool_use_shim,
            self.quiet,
            self.mcp_client,
        )
    }

    fn eval_config(&self) -> EvalConfig {
        let settings = ProviderSettings {
            host_context: self.host_cluster_context.clone(),
            host_kubeconfig: self.host_cluster_kubeconfig.clone(),
            ingress_external_ip: self.ingress_external_ip.clone(),
            proxy_ready_delay: self.proxy_ready_delay,
        };

        let mut config = EvalConfig::new(&self.agent_bin, &self.tasks_dir, &self.output_dir)
            .with_concurrency(self.concurrency.max(1) as usize)
            .with_trials(self.trials)
            .with_agent_configs(self.agent_configs())
            .with_provider(self.cluster_provider)
            .with_creation_policy(self.cluster_creation_policy)
            .with_provider_settings(settings);
        if let Some(ref pattern) = self.task_pattern {
            config = config.with_task_pattern(pattern);
        }
        if let Some(ref kubeconfig) = self.kubeconfig {
            config = config.with_kubeconfig(kubeconfig);
        }
        config
    }
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parses CLI args and runs the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_eval_command(*args).await,
        Commands::Score(args) => run_score_command(args),
    }
}

async fn run_eval_command(args: RunArgs) -> anyhow::Result<()> {
    if args.export_metrics {
        init_metrics().context("initializing metrics")?;
    }

    let config = args.eval_config();
    if config.agent_configs.is_empty() {
        anyhow::bail!("--models must name at least one model");
    }

    let summary = run_evaluation(&config)
        .await
        .context("evaluation run failed")?;

    if args.export_metrics {
        let path = config.output_dir.join(METRICS_FILE_NAME);
        fs::write(&path, export_metrics())
            .with_context(|| format!("writing metrics to {}", path.display()))?;
        info!(path = %path.display(), "Exported metrics");
    }

    if args.json {
        let records: Vec<TrialRecord> = summary.results.iter().map(TrialRecord::from).collect();
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    print_results(&summary.results);
    println!("Records: {}", summary.records_path.display());
    println!(
        "Average job time: {:.1}s",
        summary.stats.average_job_duration.as_secs_f64()
    );
    Ok(())
}

fn print_results(results: &[TaskResult]) {
    println!("\nEvaluation Results:");
    println!("==================");

    let mut sorted: Vec<&TaskResult> = results.iter().collect();
    sorted.sort_by(|a, b| {
        (&a.task, &a.agent_config.id, a.trial).cmp(&(&b.task, &b.agent_config.id, b.trial))
    });

    for result in sorted {
        println!(
            "\nTask: {}  [{} trial {}]",
            result.task, result.agent_config.id, result.trial
        );
        println!("    {}", result.result);
        if let Some(ref error) = result.error {
            println!("    Error: {}", error);
        }
        for failure in &result.failures {
            println!("    Failure: {}", failure.message);
        }
    }

    let counts = OutcomeCounts::from_results(results);
    println!(
        "\nTotal: {}  success: {}  fail: {}  error: {}",
        counts.total(),
        counts.success,
        counts.fail,
        counts.error
    );
}

fn run_score_command(args: ScoreArgs) -> anyhow::Result<()> {
    let mut records = Vec::new();
    for input in &args.inputs {
        let loaded = read_records(input)
            .with_context(|| format!("reading records from {}", input.display()))?;
        info!(path = %input.display(), count = loaded.len(), "Loaded trial records");
        records.extend(loaded);
    }
    if records.is_empty() {
        return Err(crate::error::ScoringError::NoRecords.into());
    }

    let report = render(&score(&records), args.format)?;
    match args.output {
        Some(path) => fs::write(&path, report)
            .with_context(|| format!("writing report to {}", path.display()))?,
        None => println!("{}", report),
    }
    Ok(())
}
