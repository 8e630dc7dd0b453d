//! The task loop: select a candidate, expand the prompt, run the assistant,
//! classify, record, repeat.

use std::collections::HashSet;
use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use console::style;
use tracing::{debug, info, instrument, warn};

use crate::core::backoff::Backoff;
use crate::core::budget::{BudgetStop, RunBudget};
use crate::core::candidate::{Candidate, parse_candidates};
use crate::core::classifier::{RateLimitMatcher, classify};
use crate::core::command::interpolate_command;
use crate::core::interpolate::interpolate_prompt;
use crate::core::partition::{HashPartition, filter_by_partition};
use crate::core::types::ExecOutcome;
use crate::io::config::{EnvConfig, Task};
use crate::io::environment::Environment;
use crate::io::executor::{ClaudeExecutor, ExecRequest, Executor};
use crate::io::git::Git;
use crate::io::process::{find_on_path, run_passthrough, run_silent};
use crate::io::source::{CandidateSource, ShellSource};
use crate::io::tracker::IgnoredList;
use crate::io::transcript::Transcript;

/// Per-run settings from the command line. Immutable for one run.
#[derive(Debug, Clone, Default)]
pub struct RunnerOptions {
    /// Maximum counted iterations. 0 = unlimited.
    pub limit: u32,
    /// Wall-clock budget. Zero = unlimited.
    pub time_limit: Duration,
    /// Overrides the task's `task_timeout`.
    pub task_timeout: Option<Duration>,
    pub dry_run: bool,
    pub verbose: bool,
    pub partition: HashPartition,
    /// Overrides the task and environment assistant command.
    pub claude_command: Option<String>,
}

/// Time source for limits and backoff sleeps.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

impl<T: Clock + ?Sized> Clock for &T {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration);
    }
}

/// Real clock backed by [`Instant`] and [`thread::sleep`].
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Reason why [`Runner::run`] stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStop {
    /// Every candidate in the partition is ignored.
    Exhausted,
    LimitReached,
    TimeExpired,
}

impl From<BudgetStop> for LoopStop {
    fn from(stop: BudgetStop) -> Self {
        match stop {
            BudgetStop::LimitReached => LoopStop::LimitReached,
            BudgetStop::TimeExpired => LoopStop::TimeExpired,
        }
    }
}

impl fmt::Display for LoopStop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LoopStop::Exhausted => "no candidates left",
            LoopStop::LimitReached => "iteration limit reached",
            LoopStop::TimeExpired => "time limit reached",
        })
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Counted iterations (rate-limited retries excluded).
    pub iterations: u32,
    pub successes: u32,
    pub failures: u32,
    pub rate_limits: u32,
    pub stop: LoopStop,
}

#[derive(Debug, Default)]
struct Counters {
    iterations: u32,
    successes: u32,
    failures: u32,
    rate_limits: u32,
}

impl Counters {
    fn finish(self, stop: LoopStop) -> RunSummary {
        RunSummary {
            iterations: self.iterations,
            successes: self.successes,
            failures: self.failures,
            rate_limits: self.rate_limits,
            stop,
        }
    }
}

/// Candidate chosen for an iteration, with the counts shown as progress.
struct Selection {
    candidate: Candidate,
    total: usize,
    ignored: usize,
}

/// Runs one task until it is exhausted or a limit is hit.
pub struct Runner<'a, S, E, C> {
    task: &'a Task,
    workdir: PathBuf,
    options: RunnerOptions,
    claude_command: String,
    claude_flags: String,
    timeout: Duration,
    tracker: IgnoredList,
    matcher: RateLimitMatcher,
    source: S,
    executor: E,
    clock: C,
    transcript: Option<Transcript>,
    dry_run_seen: HashSet<String>,
}

impl<'a> Runner<'a, ShellSource, ClaudeExecutor, SystemClock> {
    /// Runner for `task_name` that shells out for candidates and the assistant.
    pub fn for_environment(
        env: &'a Environment,
        task_name: &str,
        options: RunnerOptions,
    ) -> Result<Self> {
        let task = env.task(task_name)?;
        let source = ShellSource::new(&task.file.candidate_source, &env.workdir);
        Runner::new(
            task,
            &env.config,
            &env.workdir,
            options,
            source,
            ClaudeExecutor,
            SystemClock,
        )
    }
}

impl<'a, S: CandidateSource, E: Executor, C: Clock> Runner<'a, S, E, C> {
    pub fn new(
        task: &'a Task,
        config: &EnvConfig,
        workdir: &Path,
        options: RunnerOptions,
        source: S,
        executor: E,
        clock: C,
    ) -> Result<Self> {
        let claude_command = options
            .claude_command
            .clone()
            .or_else(|| task.file.claude_command.clone())
            .unwrap_or_else(|| config.claude_command.clone());
        let claude_flags = task
            .file
            .claude_flags
            .clone()
            .unwrap_or_else(|| config.claude_flags.clone());
        let timeout = options.task_timeout.unwrap_or(task.timeout);

        let mut tracker = IgnoredList::load(&task.dir)?;
        tracker.set_max_repeat(task.file.max_repeat);
        let matcher = task.rate_limit_matcher()?;

        Ok(Self {
            task,
            workdir: workdir.to_path_buf(),
            options,
            claude_command,
            claude_flags,
            timeout,
            tracker,
            matcher,
            source,
            executor,
            clock,
            transcript: None,
            dry_run_seen: HashSet::new(),
        })
    }

    pub fn claude_command(&self) -> &str {
        &self.claude_command
    }

    pub fn tracker(&self) -> &IgnoredList {
        &self.tracker
    }

    /// Run the loop, writing status lines and assistant output to `out`.
    ///
    /// Returns `Err` only for fatal conditions: candidate source or parse
    /// failures, and tracker I/O failures.
    #[instrument(skip_all, fields(task = %self.task.name, partition = %self.options.partition, dry_run = self.options.dry_run))]
    pub fn run(&mut self, out: &mut dyn Write) -> Result<RunSummary> {
        let budget = RunBudget::new(
            self.options.limit,
            self.options.time_limit,
            self.clock.now(),
        );
        let mut backoff = Backoff::default();
        let mut counters = Counters::default();
        let mut retry: Option<Candidate> = None;

        loop {
            let mut progress = None;
            let candidate = match retry.take() {
                Some(candidate) => candidate,
                None => match self.select()? {
                    Some(selection) => {
                        progress = Some((selection.total, selection.ignored));
                        selection.candidate
                    }
                    None => {
                        info!("no candidates left");
                        return Ok(counters.finish(LoopStop::Exhausted));
                    }
                },
            };
            if let Some(stop) = budget.check(counters.iterations, self.clock.now()) {
                let stop = LoopStop::from(stop);
                info!(%stop, "stopping");
                return Ok(counters.finish(stop));
            }
            let task_id = counters.iterations + 1;
            if let Some((total, ignored)) = progress {
                report_progress(out, candidate.key(), total, ignored, task_id);
            }

            let prompt = match interpolate_prompt(&self.task.prompt, &candidate, u64::from(task_id))
            {
                Ok(prompt) => prompt,
                Err(err) => {
                    warn!(key = candidate.key(), err = %err, "prompt interpolation failed");
                    status(out, style(format!("  skipped: {err}")).red());
                    self.record(candidate.key())?;
                    counters.iterations += 1;
                    counters.failures += 1;
                    continue;
                }
            };

            if self.options.dry_run {
                self.print_dry_run(out, &candidate, &prompt);
                self.dry_run_seen.insert(candidate.key().to_string());
                counters.iterations += 1;
                continue;
            }

            if self.options.verbose {
                status(out, style("Prompt:").dim());
                status(out, &prompt);
            }

            match self.attempt(out, &candidate, &prompt)? {
                ExecOutcome::RateLimited(marker) => {
                    counters.rate_limits += 1;
                    let delay = backoff.next_delay();
                    warn!(key = candidate.key(), %marker, delay_secs = delay.as_secs(), "rate limited");
                    status(
                        out,
                        style(format!(
                            "  rate limited ({marker}); retrying in {}",
                            format_delay(delay)
                        ))
                        .yellow(),
                    );
                    self.clock.sleep(delay);
                    retry = Some(candidate);
                }
                ExecOutcome::Success => {
                    backoff.reset();
                    status(out, style("  success").green());
                    self.record(candidate.key())?;
                    counters.iterations += 1;
                    counters.successes += 1;
                }
                ExecOutcome::Failed(reason) => {
                    backoff.reset();
                    status(out, style(format!("  failed: {reason}")).red());
                    self.record(candidate.key())?;
                    counters.iterations += 1;
                    counters.failures += 1;
                }
            }
        }
    }

    /// Re-run the source and pick the first candidate not yet ignored.
    fn select(&mut self) -> Result<Option<Selection>> {
        let raw = self.source.fetch()?;
        let candidates = parse_candidates(&raw).context("parse candidates")?;
        let in_partition = filter_by_partition(candidates, self.options.partition);
        let total = in_partition.len();

        let mut ignored = 0;
        let mut chosen = None;
        for candidate in in_partition {
            if self.is_skipped(candidate.key()) {
                ignored += 1;
            } else if chosen.is_none() {
                chosen = Some(candidate);
            }
        }
        debug!(total, ignored, "candidates selected");
        Ok(chosen.map(|candidate| Selection {
            candidate,
            total,
            ignored,
        }))
    }

    fn is_skipped(&self, key: &str) -> bool {
        self.tracker.contains(key) || self.dry_run_seen.contains(key)
    }

    fn record(&mut self, key: &str) -> Result<()> {
        if self.options.dry_run {
            self.dry_run_seen.insert(key.to_string());
            return Ok(());
        }
        self.tracker.add(key)?;
        Ok(())
    }

    /// Execute, classify, then verify and commit accepted results.
    fn attempt(
        &mut self,
        out: &mut dyn Write,
        candidate: &Candidate,
        prompt: &str,
    ) -> Result<ExecOutcome> {
        let request = ExecRequest {
            workdir: self.workdir.clone(),
            prompt: prompt.to_string(),
            command: self.claude_command.clone(),
            flags: self.claude_flags.clone(),
            timeout: self.timeout,
        };

        self.open_transcript();
        let report = match self.transcript.as_mut() {
            Some(log) => {
                if let Err(e) = log.start_entry(prompt) {
                    warn!(err = %e, "failed to write transcript header");
                }
                let report = self.executor.exec(&request, out, log);
                if let Err(e) = log.end_entry() {
                    warn!(err = %e, "failed to write transcript footer");
                }
                report
            }
            None => self.executor.exec(&request, out, &mut io::sink()),
        };
        let outcome = match report {
            Ok(report) => classify(&report, &self.matcher),
            Err(err) => {
                warn!(err = %format!("{err:#}"), "assistant could not be run");
                ExecOutcome::Failed(format!("{err:#}"))
            }
        };
        if outcome != ExecOutcome::Success {
            return Ok(outcome);
        }

        if let Some(verify) = &self.task.file.verify_command {
            let command = interpolate_command(verify, candidate, &self.task.name);
            if let Err(err) = run_silent(&command, &self.workdir, true) {
                if self.task.file.accept_best_effort {
                    status(
                        out,
                        style(format!("  verification failed, keeping best effort: {err:#}"))
                            .yellow(),
                    );
                } else {
                    return Ok(ExecOutcome::Failed(format!("verification failed: {err:#}")));
                }
            }
        }

        if let Some(commit) = &self.task.file.commit_command {
            let command = interpolate_command(commit, candidate, &self.task.name);
            if let Err(err) = run_passthrough(&command, &self.workdir) {
                warn!(err = %format!("{err:#}"), "commit command failed");
                status(out, style(format!("  commit failed: {err:#}")).yellow());
            }
        }
        Ok(ExecOutcome::Success)
    }

    /// Lazily open the transcript. A failure to open is logged and ignored.
    fn open_transcript(&mut self) {
        if self.transcript.is_some() {
            return;
        }
        match Transcript::open(&self.task.dir) {
            Ok(t) => self.transcript = Some(t),
            Err(err) => warn!(err = %format!("{err:#}"), "transcript unavailable"),
        }
    }

    fn print_dry_run(&self, out: &mut dyn Write, candidate: &Candidate, prompt: &str) {
        status(out, style("  dry run, prompt:").yellow());
        status(out, prompt);
        for (label, command) in [
            ("verify", &self.task.file.verify_command),
            ("commit", &self.task.file.commit_command),
        ] {
            if let Some(command) = command {
                let expanded = interpolate_command(command, candidate, &self.task.name);
                status(out, style(format!("  {label}: {expanded}")).dim());
            }
        }
    }
}

/// Print one status line. A broken terminal is logged, never fatal to the run.
fn status(out: &mut dyn Write, line: impl fmt::Display) {
    if let Err(e) = writeln!(out, "{line}") {
        warn!(err = %e, "failed to write status line");
    }
}

fn report_progress(out: &mut dyn Write, key: &str, total: usize, ignored: usize, task_id: u32) {
    status(
        out,
        format_args!(
            "{} {}",
            style(format!("[{task_id}]")).cyan().bold(),
            style(key).cyan()
        ),
    );
    status(
        out,
        style(format!(
            "  {} remaining, {ignored} ignored, {total} total",
            total - ignored
        ))
        .dim(),
    );
}

/// Checks that must pass before the loop starts.
///
/// The dirty-tree guard and the assistant lookup are skipped in dry-run.
pub fn preflight(env: &Environment, options: &RunnerOptions, claude_command: &str) -> Result<()> {
    if options.dry_run {
        return Ok(());
    }
    if env.config.require_clean_tree
        && Git::new(&env.workdir)
            .has_uncommitted_changes()
            .context("check working tree")?
    {
        return Err(anyhow!(
            "working tree has uncommitted changes (commit or stash them, or set require_clean_tree = false)"
        ));
    }
    let program = claude_command
        .split_whitespace()
        .next()
        .ok_or_else(|| anyhow!("empty claude command"))?;
    if find_on_path(program).is_none() {
        return Err(anyhow!("claude command not found: {program}"));
    }
    Ok(())
}

/// `5m`, `1h`, `90s`.
pub fn format_delay(delay: Duration) -> String {
    let secs = delay.as_secs();
    if secs >= 3600 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs >= 60 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}
