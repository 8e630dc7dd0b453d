//! Git adapter for the dirty-tree guard.

use std::path::PathBuf;
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// True when there are unstaged, staged, or untracked changes.
    #[instrument(skip_all, fields(workdir = %self.workdir.display()))]
    pub fn has_uncommitted_changes(&self) -> Result<bool> {
        if !self.quiet(&["diff", "--quiet"])? {
            debug!("unstaged changes present");
            return Ok(true);
        }
        if !self.quiet(&["diff", "--cached", "--quiet"])? {
            debug!("staged changes present");
            return Ok(true);
        }
        let out = self.run_checked(&["status", "--porcelain"])?;
        let dirty = !String::from_utf8_lossy(&out.stdout).trim().is_empty();
        debug!(dirty, "status checked");
        Ok(dirty)
    }

    /// Run a `--quiet` query: exit 0 is true, exit 1 is false, anything else fails.
    fn quiet(&self, args: &[&str]) -> Result<bool> {
        let output = self.run(args)?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()))
            }
        }
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .expect("spawn git")
            .status;
        assert!(status.success(), "git {args:?}");
    }

    fn init_repo(dir: &Path) {
        git(dir, &["init", "-q"]);
        git(dir, &["config", "user.email", "test@example.com"]);
        git(dir, &["config", "user.name", "Test"]);
        fs::write(dir.join("a.txt"), "one\n").expect("write");
        git(dir, &["add", "a.txt"]);
        git(dir, &["commit", "-q", "-m", "init"]);
    }

    #[test]
    fn detects_each_kind_of_change() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_repo(temp.path());
        let repo = Git::new(temp.path());
        assert!(!repo.has_uncommitted_changes().expect("clean"));

        fs::write(temp.path().join("untracked.txt"), "x").expect("write");
        assert!(repo.has_uncommitted_changes().expect("untracked"));
        fs::remove_file(temp.path().join("untracked.txt")).expect("rm");

        fs::write(temp.path().join("a.txt"), "two\n").expect("write");
        assert!(repo.has_uncommitted_changes().expect("unstaged"));

        git(temp.path(), &["add", "a.txt"]);
        assert!(repo.has_uncommitted_changes().expect("staged"));
    }

    #[test]
    fn outside_a_repository_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let repo = Git::new(temp.path());
        assert!(repo.has_uncommitted_changes().is_err());
    }
}
