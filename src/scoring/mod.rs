//! Offline scoring of repeated trials.
//!
//! Reads one or more trial record streams and reduces them to pass@k
//! statistics per model and per task.

pub mod aggregate;
pub mod pass_at_k;
pub mod records;
pub mod report;

pub use aggregate::{score, ModelSummary, Scoreboard, TaskModelStats, TaskSummary};
pub use pass_at_k::pass_at_k;
pub use records::{append_records, parse_records, read_records, TrialRecord, RECORDS_FILE_NAME};
pub use report::{render, render_markdown, ReportFormat};
