//! Progress extraction from converter output.
//!
//! Best effort only: a line that happens to contain a percentage is reported as
//! progress. The job outcome never depends on it.

use regex::Regex;

const PROGRESS_PATTERN: &str = r"(\d{1,3})(?:\.\d+)?\s*%";

#[derive(Debug, Clone)]
pub struct ProgressParser {
    pattern: Regex,
}

impl ProgressParser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(PROGRESS_PATTERN)?,
        })
    }

    /// Percentage found in `line`, truncated to an integer and capped at 100.
    pub fn parse(&self, line: &str) -> Option<u8> {
        let caps = self.pattern.captures(line)?;
        let value: u16 = caps.get(1)?.as_str().parse().ok()?;
        Some(value.min(100) as u8)
    }
}
