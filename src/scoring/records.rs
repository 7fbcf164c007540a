//! Line-delimited trial record stream.
//!
//! One JSON object per completed trial. This is the only contract between
//! evaluation runs and the scoring pass.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ScoringError;
use crate::runner::{Outcome, TaskResult};

/// File name of the record stream inside an output directory.
pub const RECORDS_FILE_NAME: &str = "results.jsonl";

/// One completed trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub model: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub config_id: String,
    pub task: String,
    #[serde(default)]
    pub trial: usize,
    pub result: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TrialRecord {
    pub fn is_success(&self) -> bool {
        self.result == Outcome::Success
    }
}

impl From<&TaskResult> for TrialRecord {
    fn from(result: &TaskResult) -> Self {
        Self {
            model: result.agent_config.model_id.clone(),
            provider: result.agent_config.provider_id.clone(),
            config_id: result.agent_config.id.clone(),
            task: result.task.clone(),
            trial: result.trial,
            result: result.result,
            message: result.message(),
        }
    }
}

/// Appends one record per result to `path`, creating the file if needed.
pub fn append_records(path: &Path, results: &[TaskResult]) -> Result<(), ScoringError> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    for result in results {
        let line = serde_json::to_string(&TrialRecord::from(result))?;
        writeln!(file, "{}", line)?;
    }
    file.flush()?;
    debug!(path = %path.display(), count = results.len(), "Appended trial records");
    Ok(())
}

/// Parses a record stream. Blank lines are ignored and malformed lines are
/// skipped with a warning.
pub fn parse_records<R: BufRead>(reader: R, source: &str) -> Result<Vec<TrialRecord>, ScoringError> {
    let mut records = Vec::new();
    for (idx, raw) in reader.split(b'\n').enumerate() {
        let raw = raw?;
        let Ok(line) = std::str::from_utf8(&raw) else {
            warn!(source = %source, line = idx + 1, "Skipping trial record that is not valid UTF-8");
            continue;
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<TrialRecord>(trimmed) {
            Ok(record) => records.push(record),
            Err(e) => warn!(
                source = %source,
                line = idx + 1,
                error = %e,
                "Skipping malformed trial record"
            ),
        }
    }
    Ok(records)
}

/// Reads a record stream from a file. A directory is searched for
/// [`RECORDS_FILE_NAME`].
pub fn read_records(path: &Path) -> Result<Vec<TrialRecord>, ScoringError> {
    let path = if path.is_dir() {
        path.join(RECORDS_FILE_NAME)
    } else {
        path.to_path_buf()
    };
    let file = fs::File::open(&path).map_err(|source| ScoringError::Read {
        path: path.clone(),
        source,
    })?;
    parse_records(BufReader::new(file), &path.display().to_string())
}
