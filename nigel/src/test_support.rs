//! Scripted fakes and fixtures for runner tests.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};

use crate::core::types::ExecReport;
use crate::io::config::{TASK_FILE_NAME, Task, load_task};
use crate::io::executor::{ExecRequest, Executor};
use crate::io::source::CandidateSource;
use crate::runner::Clock;

/// Candidate source returning the same listing every time.
pub struct ScriptedSource {
    output: Vec<u8>,
    calls: Cell<usize>,
}

impl ScriptedSource {
    pub fn fixed(output: &str) -> Self {
        Self {
            output: output.as_bytes().to_vec(),
            calls: Cell::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl CandidateSource for ScriptedSource {
    fn fetch(&self) -> Result<Vec<u8>> {
        self.calls.set(self.calls.get() + 1);
        Ok(self.output.clone())
    }
}

/// Executor returning queued reports and recording every prompt.
pub struct ScriptedExecutor {
    reports: RefCell<VecDeque<ExecReport>>,
    prompts: RefCell<Vec<String>>,
    output: RefCell<String>,
}

impl ScriptedExecutor {
    pub fn new(reports: Vec<ExecReport>) -> Self {
        Self {
            reports: RefCell::new(reports.into()),
            prompts: RefCell::new(Vec::new()),
            output: RefCell::new(String::new()),
        }
    }

    /// Text written to the output and log sinks on every invocation.
    pub fn set_output(&self, text: &str) {
        *self.output.borrow_mut() = text.to_string();
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }
}

impl Executor for ScriptedExecutor {
    fn exec(
        &self,
        request: &ExecRequest,
        output: &mut dyn Write,
        log: &mut dyn Write,
    ) -> Result<ExecReport> {
        self.prompts.borrow_mut().push(request.prompt.clone());
        let text = self.output.borrow();
        output.write_all(text.as_bytes())?;
        log.write_all(text.as_bytes())?;
        self.reports
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted executor ran out of reports"))
    }
}

/// Clock that only moves when slept on.
pub struct ManualClock {
    start: Instant,
    elapsed: Cell<Duration>,
    sleeps: RefCell<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            elapsed: Cell::new(Duration::ZERO),
            sleeps: RefCell::new(Vec::new()),
        }
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed.get()
    }

    fn sleep(&self, duration: Duration) {
        self.elapsed.set(self.elapsed.get() + duration);
        self.sleeps.borrow_mut().push(duration);
    }
}

/// Temporary project with `nigel/<name>/task.yaml`.
pub struct TaskDir {
    temp: tempfile::TempDir,
    name: String,
}

impl TaskDir {
    pub fn new(name: &str, task_yaml: &str) -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path().join("nigel").join(name);
        fs::create_dir_all(&dir).expect("create task dir");
        fs::write(dir.join(TASK_FILE_NAME), task_yaml).expect("write task.yaml");
        Self {
            temp,
            name: name.to_string(),
        }
    }

    /// Project root, used as the working directory.
    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn nigel_dir(&self) -> PathBuf {
        self.root().join("nigel")
    }

    pub fn task_dir(&self) -> PathBuf {
        self.nigel_dir().join(&self.name)
    }

    pub fn task(&self) -> Task {
        load_task(&self.name, &self.task_dir()).expect("load task")
    }
}
