//! Shared deterministic types for the nigel core.
//!
//! These types define stable contracts between the executor adapters and the
//! runner loop. They hold no handles and perform no I/O.

/// Raw facts about one finished assistant invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecReport {
    /// Process exited with status 0.
    pub success: bool,
    pub exit_code: Option<i32>,
    /// The per-candidate timeout expired and the process group was killed.
    pub timed_out: bool,
    /// Tail of captured stderr, for diagnostics and rate-limit detection.
    pub stderr: String,
    /// Text of a terminal `result` event flagged as an error.
    pub result_error: Option<String>,
}

impl ExecReport {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            exit_code: Some(0),
            ..Self::default()
        }
    }

    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            exit_code: Some(exit_code),
            stderr: stderr.into(),
            ..Self::default()
        }
    }
}

/// Classification of an invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecOutcome {
    Success,
    /// Ordinary failure (non-zero exit, timeout, failed verification).
    Failed(String),
    /// The tool reported throttling; retry the same candidate after backoff.
    RateLimited(String),
}
