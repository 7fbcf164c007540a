//! Loads task specifications from a directory tree.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use regex::Regex;
use tracing::{debug, info};
use walkdir::WalkDir;

use super::spec::Task;
use crate::error::TaskError;

/// Name of the specification file inside each task directory.
pub const TASK_FILE_NAME: &str = "task.yaml";

/// Loads every enabled task under `tasks_dir` whose identifier matches `pattern`.
///
/// Only immediate subdirectories are considered. A malformed task file aborts
/// the whole load.
pub fn load_tasks(
    tasks_dir: &Path,
    pattern: Option<&str>,
) -> Result<BTreeMap<String, Task>, TaskError> {
    let filter = match pattern.filter(|p| !p.is_empty()) {
        Some(p) => Some(Regex::new(p).map_err(|source| TaskError::InvalidPattern {
            pattern: p.to_string(),
            source,
        })?),
        None => None,
    };

    let mut tasks = BTreeMap::new();

    let entries = WalkDir::new(tasks_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name();

    for entry in entries {
        let entry = entry.map_err(|e| TaskError::Io(e.into()))?;
        if !entry.file_type().is_dir() {
            continue;
        }

        let task_id = entry.file_name().to_string_lossy().to_string();
        if let Some(ref re) = filter {
            if !re.is_match(&task_id) {
                debug!(task_id = %task_id, "Task does not match pattern");
                continue;
            }
        }

        let task_file = entry.path().join(TASK_FILE_NAME);
        let content = fs::read_to_string(&task_file).map_err(|source| TaskError::Read {
            path: task_file.clone(),
            source,
        })?;

        let mut task: Task = serde_yaml::from_str(&content).map_err(|source| TaskError::Parse {
            path: task_file.clone(),
            source,
        })?;

        if task.disabled {
            info!(task_id = %task_id, "Skipping disabled task");
            continue;
        }

        task.dir = fs::canonicalize(entry.path())?;
        task.id = task_id.clone();
        tasks.insert(task_id, task);
    }

    info!(count = tasks.len(), dir = %tasks_dir.display(), "Loaded tasks");
    Ok(tasks)
}
