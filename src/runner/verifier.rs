//! Transcript-based expectation matching.

use regex::Regex;
use tracing::debug;

use super::result::Failure;
use crate::task::Expectation;

/// Marker the agent prints before each command it executes.
pub const COMMAND_MARKER: &str = "Running:";

/// The transcript segment produced by the agent's last command.
///
/// That is everything after the line holding the last [`COMMAND_MARKER`].
/// Without any marker the whole transcript is returned; a marker on the
/// final, unterminated line yields an empty segment.
pub fn last_command_output(transcript: &str) -> &str {
    match transcript.rfind(COMMAND_MARKER) {
        None => transcript,
        Some(idx) => {
            let remaining = &transcript[idx..];
            match remaining.find('\n') {
                Some(nl) => &remaining[nl + 1..],
                None => "",
            }
        }
    }
}

/// Checks every expectation against the last command's output.
///
/// Returns one failure per unmatched or invalid pattern. Empty patterns are
/// ignored.
pub fn match_expectations(expectations: &[Expectation], transcript: &str) -> Vec<Failure> {
    let output = last_command_output(transcript);
    let mut failures = Vec::new();

    for expect in expectations.iter().filter(|e| !e.contains.is_empty()) {
        let re = match Regex::new(&expect.contains) {
            Ok(re) => re,
            Err(e) => {
                failures.push(Failure::new(format!(
                    "invalid regex {:?} in task spec: {}",
                    expect.contains, e
                )));
                continue;
            }
        };

        if re.is_match(output) {
            debug!(pattern = %expect.contains, "Expectation matched");
        } else {
            failures.push(Failure::new(format!(
                "regex {:?} did not match output {:?}",
                expect.contains, output
            )));
        }
    }

    failures
}
