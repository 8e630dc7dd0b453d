//! Helpers for running shell commands and streaming child output.
//!
//! Every command goes through `bash -c` in an explicit working directory.
//! The streaming runner drains stdout and stderr on reader threads and hands
//! lines to the calling thread over a channel, so the caller can dispatch
//! output and enforce a deadline without risking pipe deadlocks.
//!
//! Streamed children run in their own process group so a timeout can take
//! down their descendants too. Live groups are tracked so an interrupt of
//! nigel itself can kill them with [`kill_live_groups`].

use std::collections::BTreeSet;
use std::env;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Build `bash -c <command>` rooted at `workdir`.
pub fn shell_command(command: &str, workdir: &Path) -> Command {
    let mut cmd = Command::new("bash");
    cmd.arg("-c").arg(command).current_dir(workdir);
    cmd
}

/// Run `command` and return its stdout. A non-zero exit is an error carrying stderr.
#[instrument(skip_all, fields(workdir = %workdir.display()))]
pub fn run_capture(command: &str, workdir: &Path) -> Result<Vec<u8>> {
    debug!(command, "running capture command");
    let output = shell_command(command, workdir)
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("spawn '{command}'"))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(exit_code = ?output.status.code(), "capture command failed");
        return Err(anyhow!(
            "command '{command}' failed with {}: {}",
            describe_status(output.status),
            stderr.trim()
        ));
    }
    Ok(output.stdout)
}

/// Run `command` with stdout and stderr attached to the terminal.
#[instrument(skip_all, fields(workdir = %workdir.display()))]
pub fn run_passthrough(command: &str, workdir: &Path) -> Result<()> {
    debug!(command, "running passthrough command");
    let status = shell_command(command, workdir)
        .stdin(Stdio::null())
        .status()
        .with_context(|| format!("spawn '{command}'"))?;
    if !status.success() {
        return Err(anyhow!(
            "command '{command}' failed with {}",
            describe_status(status)
        ));
    }
    Ok(())
}

/// Run `command` with output captured.
///
/// With `show_on_fail`, captured stdout and stderr are echoed to the terminal
/// when the command fails. Successful runs print nothing.
#[instrument(skip_all, fields(workdir = %workdir.display(), show_on_fail))]
pub fn run_silent(command: &str, workdir: &Path, show_on_fail: bool) -> Result<()> {
    debug!(command, "running silent command");
    let output = shell_command(command, workdir)
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("spawn '{command}'"))?;
    if output.status.success() {
        return Ok(());
    }
    if show_on_fail {
        let mut out = io::stdout().lock();
        let _ = out.write_all(&output.stdout);
        let _ = out.flush();
        let mut err = io::stderr().lock();
        let _ = err.write_all(&output.stderr);
        let _ = err.flush();
    }
    Err(anyhow!(
        "command '{command}' failed with {}",
        describe_status(output.status)
    ))
}

/// One line read from a streamed child, newline included when present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// How a streamed child finished.
#[derive(Debug)]
pub struct StreamExit {
    pub status: Option<ExitStatus>,
    pub timed_out: bool,
}

impl StreamExit {
    pub fn success(&self) -> bool {
        !self.timed_out && self.status.is_some_and(|s| s.success())
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.status.and_then(|s| s.code())
    }
}

/// Spawn `cmd` and deliver its output line by line to `on_line`.
///
/// `timeout` of zero means no deadline. On expiry the child's whole process
/// group is killed and the result is reported with `timed_out` set.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs()))]
pub fn run_streaming<F>(mut cmd: Command, timeout: Duration, mut on_line: F) -> Result<StreamExit>
where
    F: FnMut(OutputLine),
{
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    debug!("spawning streamed child");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };
    let _live = LiveGroup::register(child.id());

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let (tx, rx) = mpsc::channel();
    let stdout_tx = tx.clone();
    let stdout_handle = thread::spawn(move || forward_lines(stdout, &stdout_tx, OutputLine::Stdout));
    let stderr_handle = thread::spawn(move || forward_lines(stderr, &tx, OutputLine::Stderr));

    let deadline = (!timeout.is_zero()).then(|| Instant::now() + timeout);
    let mut timed_out = false;
    loop {
        let received = match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                rx.recv_timeout(remaining)
            }
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match received {
            Ok(line) => on_line(line),
            Err(RecvTimeoutError::Timeout) => {
                timed_out = true;
                break;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let status = if timed_out {
        None
    } else {
        match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match child.wait_timeout(remaining).context("wait for command")? {
                    Some(status) => Some(status),
                    None => {
                        timed_out = true;
                        None
                    }
                }
            }
            None => Some(child.wait().context("wait for command")?),
        }
    };

    if timed_out {
        warn!(timeout_secs = timeout.as_secs(), "command timed out, killing process group");
        kill_process_group(&mut child);
        child.wait().context("wait command after kill")?;
        // Readers may still be blocked on pipes held by escaped descendants.
        drop(stdout_handle);
        drop(stderr_handle);
        return Ok(StreamExit {
            status: None,
            timed_out,
        });
    }

    join_reader(stdout_handle).context("join stdout")?;
    join_reader(stderr_handle).context("join stderr")?;
    debug!(exit_code = ?status.and_then(|s| s.code()), "streamed command finished");
    Ok(StreamExit { status, timed_out })
}

fn forward_lines<R: Read>(
    reader: R,
    tx: &Sender<OutputLine>,
    wrap: fn(String) -> OutputLine,
) -> Result<()> {
    let mut reader = BufReader::new(reader);
    loop {
        let mut buf = Vec::new();
        let n = reader.read_until(b'\n', &mut buf).context("read line")?;
        if n == 0 {
            return Ok(());
        }
        let line = String::from_utf8_lossy(&buf).into_owned();
        if tx.send(wrap(line)).is_err() {
            // Receiver gone: the caller stopped listening.
            return Ok(());
        }
    }
}

fn join_reader(handle: thread::JoinHandle<Result<()>>) -> Result<()> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn kill_process_group(child: &mut Child) {
    match kill_group(child.id()) {
        Ok(()) => return,
        Err(e) => warn!(err = %e, "kill of process group failed"),
    }
    if let Err(e) = child.kill() {
        warn!(err = %e, "failed to kill child");
    }
}

/// Process groups of streamed children that have not been reaped yet.
static LIVE_GROUPS: Mutex<BTreeSet<u32>> = Mutex::new(BTreeSet::new());

fn live_groups() -> MutexGuard<'static, BTreeSet<u32>> {
    LIVE_GROUPS.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registration of one streamed child's group, removed on drop.
struct LiveGroup(u32);

impl LiveGroup {
    fn register(pgid: u32) -> Self {
        live_groups().insert(pgid);
        Self(pgid)
    }
}

impl Drop for LiveGroup {
    fn drop(&mut self) {
        live_groups().remove(&self.0);
    }
}

/// SIGKILL every live streamed child's process group.
///
/// Meant for interrupt handlers: the children do not share nigel's process
/// group, so a terminal Ctrl-C never reaches them. Returns how many groups
/// were signalled.
pub fn kill_live_groups() -> usize {
    let groups: Vec<u32> = live_groups().iter().copied().collect();
    for &pgid in &groups {
        if let Err(e) = kill_group(pgid) {
            warn!(pgid, err = %e, "kill of live process group failed");
        }
    }
    groups.len()
}

#[cfg(unix)]
fn kill_group(pgid: u32) -> io::Result<()> {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let pgid = i32::try_from(pgid).map_err(io::Error::other)?;
    killpg(Pid::from_raw(pgid), Signal::SIGKILL).map_err(io::Error::from)
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "process groups are unix-only",
    ))
}

/// Resolve `program` the way the shell would: as a path when it contains a
/// separator, otherwise through `PATH`.
pub fn find_on_path(program: &str) -> Option<PathBuf> {
    if program.contains('/') {
        let path = PathBuf::from(program);
        return is_executable(&path).then_some(path);
    }
    let path_var = env::var_os("PATH")?;
    env::split_paths(&path_var)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    let Ok(meta) = path.metadata() else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

fn describe_status(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit status {code}"),
        None => "signal".to_string(),
    }
}
