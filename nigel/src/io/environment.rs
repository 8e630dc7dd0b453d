//! Discovery of the `nigel/` directory and its tasks.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

use crate::io::config::{ENV_CONFIG_FILE_NAME, EnvConfig, TASK_FILE_NAME, Task, load_env_config, load_task};

/// Overrides the task directory location.
pub const NIGEL_DIR_ENV: &str = "NIGEL_DIR";
pub const DEFAULT_DIR_NAME: &str = "nigel";

/// The project the runner works in and the tasks defined for it.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Working directory for every command.
    pub workdir: PathBuf,
    /// Directory holding `config.toml` and one subdirectory per task.
    pub nigel_dir: PathBuf,
    pub config: EnvConfig,
    pub tasks: BTreeMap<String, Task>,
}

impl Environment {
    /// Discover from the current directory, honoring `NIGEL_DIR`.
    pub fn discover() -> Result<Self> {
        let workdir = env::current_dir().context("resolve current directory")?;
        let nigel_dir = env::var_os(NIGEL_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| workdir.join(DEFAULT_DIR_NAME));
        Self::load(workdir, nigel_dir)
    }

    /// Load config and every `<nigel_dir>/<task>/task.yaml`.
    #[instrument(skip_all, fields(nigel_dir = %nigel_dir.display()))]
    pub fn load(workdir: PathBuf, nigel_dir: PathBuf) -> Result<Self> {
        if !nigel_dir.is_dir() {
            return Err(anyhow!(
                "task directory {} not found (set {NIGEL_DIR_ENV} or create ./{DEFAULT_DIR_NAME})",
                nigel_dir.display()
            ));
        }
        let config = load_env_config(&nigel_dir.join(ENV_CONFIG_FILE_NAME))?;
        let tasks = load_tasks(&nigel_dir)?;
        debug!(tasks = tasks.len(), "environment discovered");
        Ok(Self {
            workdir,
            nigel_dir,
            config,
            tasks,
        })
    }

    pub fn task(&self, name: &str) -> Result<&Task> {
        self.tasks.get(name).ok_or_else(|| {
            anyhow!("task '{name}' not found in {}", self.nigel_dir.display())
        })
    }
}

fn load_tasks(nigel_dir: &Path) -> Result<BTreeMap<String, Task>> {
    let mut tasks = BTreeMap::new();
    let entries =
        fs::read_dir(nigel_dir).with_context(|| format!("read {}", nigel_dir.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("read {}", nigel_dir.display()))?;
        let dir = entry.path();
        if !dir.is_dir() || !dir.join(TASK_FILE_NAME).is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let task = load_task(&name, &dir)?;
        tasks.insert(name, task);
    }
    Ok(tasks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovers_tasks_with_task_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let nigel = temp.path().join("nigel");
        for name in ["beta", "alpha"] {
            let dir = nigel.join(name);
            fs::create_dir_all(&dir).expect("mkdir");
            fs::write(dir.join(TASK_FILE_NAME), "candidate_source: echo x\nprompt: p\n")
                .expect("write");
        }
        fs::create_dir_all(nigel.join("notes")).expect("mkdir");
        fs::write(nigel.join(ENV_CONFIG_FILE_NAME), "require_clean_tree = false\n")
            .expect("write config");

        let env = Environment::load(temp.path().to_path_buf(), nigel).expect("load");
        let names: Vec<&str> = env.tasks.keys().map(String::as_str).collect();
        assert_eq!(names, ["alpha", "beta"]);
        assert!(!env.config.require_clean_tree);
        assert!(env.task("alpha").is_ok());
        assert!(env.task("notes").is_err());
    }

    #[test]
    fn missing_directory_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = Environment::load(temp.path().to_path_buf(), temp.path().join("nigel"))
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn broken_task_names_its_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path().join("broken");
        fs::create_dir_all(&dir).expect("mkdir");
        fs::write(dir.join(TASK_FILE_NAME), "prompt: p\n").expect("write");
        let err = Environment::load(temp.path().to_path_buf(), temp.path().to_path_buf())
            .unwrap_err();
        assert!(format!("{err:#}").contains("task.yaml"));
    }
}
