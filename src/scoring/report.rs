//! Text renderings of a [`Scoreboard`].

use std::fmt::Write;

use serde::{Deserialize, Serialize};

use super::aggregate::Scoreboard;
use crate::error::ScoringError;

/// Output format of the `score` command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Markdown,
    Json,
}

impl std::str::FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "markdown" | "md" => Ok(ReportFormat::Markdown),
            "json" => Ok(ReportFormat::Json),
            other => Err(format!("Unknown report format: {}", other)),
        }
    }
}

pub fn render(board: &Scoreboard, format: ReportFormat) -> Result<String, ScoringError> {
    match format {
        ReportFormat::Markdown => Ok(render_markdown(board)),
        ReportFormat::Json => Ok(serde_json::to_string_pretty(board)?),
    }
}

pub fn render_markdown(board: &Scoreboard) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "## Models\n");
    let _ = writeln!(out, "| Model | Tasks | Trials | pass@1 | pass@5 | pass-all |");
    let _ = writeln!(out, "|-------|------:|-------:|-------:|-------:|---------:|");
    for m in &board.models {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {:.1}% | {:.1}% | {:.1}% |",
            m.model, m.tasks, m.trials, m.pass_at_1, m.pass_at_5, m.pass_all
        );
    }

    let _ = writeln!(out, "\n## Tasks\n");
    let _ = writeln!(out, "| Task | Trials | Successes | pass@1 |");
    let _ = writeln!(out, "|------|-------:|----------:|-------:|");
    for t in &board.tasks {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {:.1}% |",
            t.task, t.trials, t.successes, t.pass_at_1
        );
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::Outcome;
    use crate::scoring::{score, TrialRecord};

    fn board() -> Scoreboard {
        let records = vec![TrialRecord {
            model: "flash".to_string(),
            provider: "gemini".to_string(),
            config_id: "gemini-flash-shim_disabled".to_string(),
            task: "scale".to_string(),
            trial: 0,
            result: Outcome::Success,
            message: None,
        }];
        score(&records)
    }

    #[test]
    fn test_markdown_tables() {
        let md = render_markdown(&board());
        assert!(md.contains("| flash | 1 | 1 | 100.0% | 100.0% | 100.0% |"));
        assert!(md.contains("| scale | 1 | 1 | 100.0% |"));
    }

    #[test]
    fn test_json() {
        let json = render(&board(), ReportFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["models"][0]["model"], "flash");
        assert_eq!(value["tasks"][0]["pass_at_1"], 100.0);
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("md".parse::<ReportFormat>().unwrap(), ReportFormat::Markdown);
        assert_eq!("JSON".parse::<ReportFormat>().unwrap(), ReportFormat::Json);
        assert!("html".parse::<ReportFormat>().is_err());
    }
}
