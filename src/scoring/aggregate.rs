//! Per-model and per-task reliability statistics.

use std::collections::BTreeMap;

use serde::Serialize;

use super::pass_at_k::pass_at_k;
use super::records::TrialRecord;

/// Trials of one task under one model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskModelStats {
    pub model: String,
    pub task: String,
    pub trials: usize,
    pub successes: usize,
    pub pass_at_1: f64,
    pub pass_at_5: f64,
    /// Every trial succeeded.
    pub pass_all: bool,
}

impl TaskModelStats {
    fn new(model: &str, task: &str, trials: usize, successes: usize) -> Self {
        Self {
            model: model.to_string(),
            task: task.to_string(),
            trials,
            successes,
            pass_at_1: pass_at_k(trials, successes, 1),
            pass_at_5: pass_at_k(trials, successes, 5),
            pass_all: trials > 0 && successes == trials,
        }
    }
}

/// Aggregate for one model across every task it attempted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSummary {
    pub model: String,
    pub tasks: usize,
    pub trials: usize,
    /// Unweighted mean of per-task pass@1.
    pub pass_at_1: f64,
    /// Unweighted mean of per-task pass@5.
    pub pass_at_5: f64,
    /// Percentage of tasks where every trial succeeded.
    pub pass_all: f64,
}

/// Aggregate for one task, pooling every model's trials.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSummary {
    pub task: String,
    pub trials: usize,
    pub successes: usize,
    pub pass_at_1: f64,
}

/// Full scoring output.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Scoreboard {
    pub models: Vec<ModelSummary>,
    pub tasks: Vec<TaskSummary>,
    pub details: Vec<TaskModelStats>,
}

/// Computes every statistic from a flat list of trial records.
///
/// Record order does not matter; output is sorted by model, then task.
pub fn score(records: &[TrialRecord]) -> Scoreboard {
    // (model, task) -> (n, c)
    let mut pairs: BTreeMap<(&str, &str), (usize, usize)> = BTreeMap::new();
    let mut pooled: BTreeMap<&str, (usize, usize)> = BTreeMap::new();

    for record in records {
        let success = usize::from(record.is_success());

        let pair = pairs
            .entry((record.model.as_str(), record.task.as_str()))
            .or_default();
        pair.0 += 1;
        pair.1 += success;

        let task = pooled.entry(record.task.as_str()).or_default();
        task.0 += 1;
        task.1 += success;
    }

    let details: Vec<TaskModelStats> = pairs
        .iter()
        .map(|(&(model, task), &(n, c))| TaskModelStats::new(model, task, n, c))
        .collect();

    let mut by_model: BTreeMap<&str, Vec<&TaskModelStats>> = BTreeMap::new();
    for stats in &details {
        by_model.entry(stats.model.as_str()).or_default().push(stats);
    }

    let models = by_model
        .into_iter()
        .map(|(model, stats)| {
            let count = stats.len() as f64;
            ModelSummary {
                model: model.to_string(),
                tasks: stats.len(),
                trials: stats.iter().map(|s| s.trials).sum(),
                pass_at_1: stats.iter().map(|s| s.pass_at_1).sum::<f64>() / count,
                pass_at_5: stats.iter().map(|s| s.pass_at_5).sum::<f64>() / count,
                pass_all: 100.0 * stats.iter().filter(|s| s.pass_all).count() as f64 / count,
            }
        })
        .collect();

    let tasks = pooled
        .into_iter()
        .map(|(task, (n, c))| TaskSummary {
            task: task.to_string(),
            trials: n,
            successes: c,
            pass_at_1: pass_at_k(n, c, 1),
        })
        .collect();

    Scoreboard {
        models,
        tasks,
        details,
    }
}
