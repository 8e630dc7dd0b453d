//! Environment defaults (`nigel/config.toml`) and task definitions
//! (`nigel/<task>/task.yaml`).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::classifier::{DEFAULT_RATE_LIMIT_PATTERNS, RateLimitMatcher};
use crate::core::duration::parse_duration;

pub const ENV_CONFIG_FILE_NAME: &str = "config.toml";
pub const TASK_FILE_NAME: &str = "task.yaml";

/// Environment-wide defaults (TOML).
///
/// Every field is optional; task files and CLI flags override them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EnvConfig {
    /// Assistant command, e.g. `claude` or `npx claude`.
    pub claude_command: String,

    /// Extra flags passed to every assistant invocation.
    pub claude_flags: String,

    /// Refuse to start when the git working tree has uncommitted changes.
    pub require_clean_tree: bool,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            claude_command: "claude".to_string(),
            claude_flags: String::new(),
            require_clean_tree: true,
        }
    }
}

impl EnvConfig {
    pub fn validate(&self) -> Result<()> {
        if self.claude_command.trim().is_empty() {
            return Err(anyhow!("claude_command must not be empty"));
        }
        Ok(())
    }
}

/// Load environment config from a TOML file.
///
/// If the file is missing, returns `EnvConfig::default()`.
pub fn load_env_config(path: &Path) -> Result<EnvConfig> {
    if !path.exists() {
        return Ok(EnvConfig::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: EnvConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Raw `task.yaml` contents.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct TaskFile {
    /// Shell command printing the candidates (JSON array or one per line).
    pub candidate_source: String,
    /// Inline prompt template.
    pub prompt: Option<String>,
    /// Prompt template file, relative to the task directory.
    pub template: Option<String>,
    pub claude_command: Option<String>,
    pub claude_flags: Option<String>,
    /// Per-candidate timeout such as `10m`.
    pub task_timeout: Option<String>,
    /// Attempts per candidate before it is ignored. 0 ignores after one.
    pub max_repeat: u32,
    /// Run after a successful invocation; `$CANDIDATE` and `$TASK_NAME` expand.
    pub verify_command: Option<String>,
    /// Run after an accepted outcome.
    pub commit_command: Option<String>,
    /// Keep outcomes whose verification failed.
    pub accept_best_effort: bool,
    /// Regexes marking throttling in the assistant's errors.
    pub rate_limit_patterns: Vec<String>,
}

impl TaskFile {
    pub fn validate(&self) -> Result<()> {
        if self.candidate_source.trim().is_empty() {
            return Err(anyhow!("candidate_source must not be empty"));
        }
        match (&self.prompt, &self.template) {
            (Some(_), Some(_)) => return Err(anyhow!("set only one of prompt or template")),
            (None, None) => return Err(anyhow!("one of prompt or template is required")),
            _ => {}
        }
        if let Some(cmd) = &self.claude_command
            && cmd.trim().is_empty()
        {
            return Err(anyhow!("claude_command must not be empty"));
        }
        if let Some(timeout) = &self.task_timeout {
            parse_duration(timeout).context("parse task_timeout")?;
        }
        RateLimitMatcher::new(self.rate_limit_patterns.as_slice())?;
        Ok(())
    }
}

/// A loaded, validated task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub name: String,
    pub dir: PathBuf,
    /// Prompt template, read from `template` when given.
    pub prompt: String,
    pub timeout: Duration,
    pub file: TaskFile,
}

impl Task {
    pub fn mode(&self) -> &'static str {
        if self.file.accept_best_effort {
            "best-effort"
        } else {
            "standard"
        }
    }

    /// Configured patterns, or the built-in set when none are given.
    pub fn rate_limit_matcher(&self) -> Result<RateLimitMatcher> {
        if self.file.rate_limit_patterns.is_empty() {
            RateLimitMatcher::new(DEFAULT_RATE_LIMIT_PATTERNS)
        } else {
            RateLimitMatcher::new(self.file.rate_limit_patterns.as_slice())
        }
    }
}

/// Load and validate `<dir>/task.yaml`.
pub fn load_task(name: &str, dir: &Path) -> Result<Task> {
    let path = dir.join(TASK_FILE_NAME);
    let contents = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    let file: TaskFile =
        serde_yaml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    file.validate()
        .with_context(|| format!("validate {}", path.display()))?;

    let prompt = match (&file.prompt, &file.template) {
        (Some(prompt), _) => prompt.clone(),
        (None, Some(template)) => {
            let template_path = dir.join(template);
            fs::read_to_string(&template_path)
                .with_context(|| format!("read template {}", template_path.display()))?
        }
        (None, None) => String::new(),
    };
    let timeout = match &file.task_timeout {
        Some(t) => parse_duration(t)?,
        None => Duration::ZERO,
    };

    Ok(Task {
        name: name.to_string(),
        dir: dir.to_path_buf(),
        prompt,
        timeout,
        file,
    })
}
