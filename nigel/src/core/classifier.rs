//! Deterministic classification of assistant invocations.

use anyhow::{Context, Result};
use regex::Regex;

use crate::core::types::{ExecOutcome, ExecReport};

/// Markers the assistant CLI prints when it is throttled.
pub const DEFAULT_RATE_LIMIT_PATTERNS: &[&str] = &[
    r"(?i)rate[ _-]?limit",
    r"(?i)usage limit",
    r"(?i)too many requests",
    r"\b429\b",
    r"(?i)overloaded",
];

/// Compiled set of rate-limit markers.
#[derive(Debug, Clone)]
pub struct RateLimitMatcher {
    patterns: Vec<Regex>,
}

impl RateLimitMatcher {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p.as_ref())
                    .with_context(|| format!("compile rate limit pattern '{}'", p.as_ref()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// First line of `text` that carries a marker.
    pub fn find<'t>(&self, text: &'t str) -> Option<&'t str> {
        text.lines()
            .find(|line| self.patterns.iter().any(|re| re.is_match(line)))
            .map(str::trim)
    }
}

impl Default for RateLimitMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_LIMIT_PATTERNS).expect("default rate limit patterns should compile")
    }
}

/// Classify a finished invocation.
///
/// - A timeout is always an ordinary failure.
/// - Rate limiting is only recognized on a failed invocation, and only from
///   stderr or an error `result` event, never from the assistant's own prose.
pub fn classify(report: &ExecReport, matcher: &RateLimitMatcher) -> ExecOutcome {
    if report.timed_out {
        return ExecOutcome::Failed("timed out".to_string());
    }
    if report.success && report.result_error.is_none() {
        return ExecOutcome::Success;
    }

    let result_error = report.result_error.as_deref().unwrap_or("");
    if let Some(marker) = matcher
        .find(result_error)
        .or_else(|| matcher.find(&report.stderr))
    {
        return ExecOutcome::RateLimited(marker.to_string());
    }

    let reason = if !result_error.trim().is_empty() {
        first_line(result_error)
    } else {
        match report.exit_code {
            Some(code) => format!("exit status {code}"),
            None => "terminated by signal".to_string(),
        }
    };
    ExecOutcome::Failed(reason)
}

fn first_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default()
        .to_string()
}
