//! Candidate sources.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::io::process::run_capture;

/// Produces the raw candidate listing for one iteration.
pub trait CandidateSource {
    fn fetch(&self) -> Result<Vec<u8>>;
}

impl<T: CandidateSource + ?Sized> CandidateSource for &T {
    fn fetch(&self) -> Result<Vec<u8>> {
        (**self).fetch()
    }
}

/// Runs the task's `candidate_source` shell command and returns its stdout.
#[derive(Debug, Clone)]
pub struct ShellSource {
    pub command: String,
    pub workdir: PathBuf,
}

impl ShellSource {
    pub fn new(command: impl Into<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            workdir: workdir.into(),
        }
    }
}

impl CandidateSource for ShellSource {
    #[instrument(skip_all, fields(workdir = %self.workdir.display()))]
    fn fetch(&self) -> Result<Vec<u8>> {
        let out = run_capture(&self.command, &self.workdir).context("run candidate source")?;
        debug!(bytes = out.len(), "candidate source finished");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetches_stdout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let source = ShellSource::new(r#"echo '["a","b"]'"#, temp.path());
        assert_eq!(source.fetch().expect("fetch"), b"[\"a\",\"b\"]\n");
    }

    #[test]
    fn non_zero_exit_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let source = ShellSource::new("echo nope >&2; exit 2", temp.path());
        let err = source.fetch().unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("candidate source"), "{msg}");
        assert!(msg.contains("nope"), "{msg}");
    }
}
