//! `nigel`: run an AI coding assistant over a generated list of candidates.
//!
//! Tasks live under `nigel/<task>/task.yaml` (or `$NIGEL_DIR`). Each run
//! keeps going until every candidate is ignored or a limit is hit.

use std::io::{self, Write};
use std::process;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use console::style;

use nigel::core::duration::parse_duration;
use nigel::core::partition::HashPartition;
use nigel::exit_codes;
use nigel::io::environment::Environment;
use nigel::io::process::kill_live_groups;
use nigel::logging;
use nigel::runner::{RunSummary, Runner, RunnerOptions, preflight};

#[derive(Debug, Parser)]
#[command(
    name = "nigel",
    version,
    about = "Run an AI coding assistant over a list of candidates"
)]
struct Cli {
    /// Task to run (a directory under nigel/ holding a task.yaml).
    task: Option<String>,

    /// List available tasks.
    #[arg(long)]
    list: bool,

    /// Maximum number of iterations (0 = unlimited).
    #[arg(long, default_value_t = 0)]
    limit: u32,

    /// Maximum duration, e.g. 1h30m, 30m, 5s (0 = unlimited).
    #[arg(long, value_parser = duration_arg, default_value = "0")]
    time_limit: Duration,

    /// Per-candidate timeout, e.g. 5m (overrides task.yaml).
    #[arg(long, value_parser = duration_arg)]
    task_timeout: Option<Duration>,

    /// Assistant command (overrides task.yaml and config.toml).
    #[arg(long)]
    claude_command: Option<String>,

    /// Print prompts without running the assistant.
    #[arg(long)]
    dry_run: bool,

    /// Print prompts before running them and enable debug tracing.
    #[arg(long)]
    verbose: bool,

    /// Shard INDEX/TOTAL, 1-based (e.g. 1/4 for the first of four workers).
    #[arg(long)]
    shard: Option<HashPartition>,
}

fn duration_arg(s: &str) -> Result<Duration, String> {
    parse_duration(s).map_err(|e| format!("{e:#}"))
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    if let Err(err) = run(cli) {
        eprintln!("{}", style(format!("Error: {err:#}")).red());
        process::exit(exit_codes::INVALID);
    }
}

fn run(cli: Cli) -> Result<()> {
    install_interrupt_handler()?;
    let env = Environment::discover()?;
    if cli.list {
        return list_tasks(&env, &mut io::stdout());
    }

    let task_name = cli
        .task
        .ok_or_else(|| anyhow!("task name required (use --list to see available tasks)"))?;
    let options = RunnerOptions {
        limit: cli.limit,
        time_limit: cli.time_limit,
        task_timeout: cli.task_timeout,
        dry_run: cli.dry_run,
        verbose: cli.verbose,
        partition: cli.shard.unwrap_or_default(),
        claude_command: cli.claude_command,
    };

    let mut runner = Runner::for_environment(&env, &task_name, options.clone())?;
    preflight(&env, &options, runner.claude_command())?;

    let mut out = io::stdout();
    let summary = runner.run(&mut out)?;
    print_summary(&mut out, &summary)?;
    Ok(())
}

/// On SIGINT or SIGTERM, kill the running assistant before exiting. The
/// candidate in flight is not recorded and comes up again on the next run.
fn install_interrupt_handler() -> Result<()> {
    ctrlc::set_handler(|| {
        let killed = kill_live_groups();
        eprintln!(
            "{}",
            style(format!("Interrupted; killed {killed} assistant process group(s)")).yellow()
        );
        process::exit(exit_codes::INTERRUPTED);
    })
    .context("install interrupt handler")
}

fn list_tasks(env: &Environment, out: &mut dyn Write) -> Result<()> {
    if env.tasks.is_empty() {
        writeln!(out, "No tasks found.")?;
        return Ok(());
    }
    writeln!(out, "{}", style("Available tasks:").bold())?;
    for (name, task) in &env.tasks {
        writeln!(
            out,
            "  {} [{}]",
            style(format!("{name:<30}")).cyan(),
            task.mode()
        )?;
    }
    Ok(())
}

fn print_summary(out: &mut dyn Write, summary: &RunSummary) -> Result<()> {
    writeln!(
        out,
        "{} {} iterations: {} succeeded, {} failed, {} rate-limited",
        style(format!("Stopped: {}.", summary.stop)).bold(),
        summary.iterations,
        summary.successes,
        summary.failures,
        summary.rate_limits
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_may_follow_the_task() {
        let cli = Cli::parse_from([
            "nigel",
            "fix-lints",
            "--limit",
            "5",
            "--time-limit",
            "1h30m",
            "--dry-run",
            "--shard",
            "2/4",
        ]);
        assert_eq!(cli.task.as_deref(), Some("fix-lints"));
        assert_eq!(cli.limit, 5);
        assert_eq!(cli.time_limit, Duration::from_secs(5400));
        assert!(cli.dry_run);
        let shard = cli.shard.expect("shard");
        assert_eq!(shard.worker_index, 1);
        assert_eq!(shard.worker_count, 4);
    }

    #[test]
    fn defaults_are_unlimited() {
        let cli = Cli::parse_from(["nigel", "task"]);
        assert_eq!(cli.limit, 0);
        assert_eq!(cli.time_limit, Duration::ZERO);
        assert!(cli.task_timeout.is_none());
        assert!(cli.shard.is_none());
    }

    #[test]
    fn rejects_bad_shards_and_durations() {
        for args in [
            vec!["nigel", "t", "--shard", "0/4"],
            vec!["nigel", "t", "--shard", "5/4"],
            vec!["nigel", "t", "--shard", "1-4"],
            vec!["nigel", "t", "--task-timeout", "soon"],
        ] {
            assert!(Cli::try_parse_from(&args).is_err(), "{args:?}");
        }
    }

    #[test]
    fn list_only_needs_no_task() {
        let cli = Cli::parse_from(["nigel", "--list"]);
        assert!(cli.list);
        assert!(cli.task.is_none());
    }
}
