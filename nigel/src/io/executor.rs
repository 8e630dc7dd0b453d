//! Executor abstraction for assistant invocation.
//!
//! The [`Executor`] trait decouples the runner loop from the actual assistant
//! backend (the `claude` CLI by default). Tests use scripted executors that
//! return predetermined reports without spawning processes.

use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::command::shell_quote;
use crate::core::stream::StreamDecoder;
use crate::core::types::ExecReport;
use crate::io::process::{OutputLine, run_streaming, shell_command};
use crate::io::tee::Tee;

/// Flags that switch the assistant CLI to its line-delimited JSON protocol.
pub const STREAM_FLAGS: &str = "--verbose --output-format stream-json --include-partial-messages";

/// Keep at most this much stderr for classification and diagnostics.
const STDERR_TAIL_BYTES: usize = 16 * 1024;

/// Parameters for one assistant invocation.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    /// Working directory for the assistant process.
    pub workdir: PathBuf,
    /// Fully interpolated prompt.
    pub prompt: String,
    /// Assistant command, possibly with leading arguments (`claude`).
    pub command: String,
    /// Extra flags placed before the streaming flags.
    pub flags: String,
    /// Per-candidate timeout. Zero disables it.
    pub timeout: Duration,
}

impl ExecRequest {
    /// Shell line run through `bash -c`.
    pub fn command_line(&self) -> String {
        let mut line = self.command.trim().to_string();
        let flags = self.flags.trim();
        if !flags.is_empty() {
            line.push(' ');
            line.push_str(flags);
        }
        line.push(' ');
        line.push_str(STREAM_FLAGS);
        line.push_str(" -p ");
        line.push_str(&shell_quote(&self.prompt));
        line
    }
}

/// Abstraction over assistant backends.
///
/// Decoded assistant text goes to `output` and is mirrored into `log`.
/// Errors are reserved for failures to run at all; a non-zero exit or a
/// timeout is reported through [`ExecReport`].
pub trait Executor {
    fn exec(
        &self,
        request: &ExecRequest,
        output: &mut dyn Write,
        log: &mut dyn Write,
    ) -> Result<ExecReport>;
}

impl<T: Executor + ?Sized> Executor for &T {
    fn exec(
        &self,
        request: &ExecRequest,
        output: &mut dyn Write,
        log: &mut dyn Write,
    ) -> Result<ExecReport> {
        (**self).exec(request, output, log)
    }
}

/// Executor that spawns the assistant CLI through `bash -c`.
pub struct ClaudeExecutor;

impl Executor for ClaudeExecutor {
    #[instrument(skip_all, fields(timeout_secs = request.timeout.as_secs()))]
    fn exec(
        &self,
        request: &ExecRequest,
        output: &mut dyn Write,
        log: &mut dyn Write,
    ) -> Result<ExecReport> {
        info!(workdir = %request.workdir.display(), command = %request.command, "starting assistant");
        let cmd = shell_command(&request.command_line(), &request.workdir);

        let mut decoder = StreamDecoder::new();
        let mut stdout_tee = Tee::new(output, log);
        let mut stderr_tail = String::new();
        let mut write_failed: Option<io::Error> = None;

        let exit = run_streaming(cmd, request.timeout, |line| {
            let result = match line {
                OutputLine::Stdout(line) => match decoder.feed(&line) {
                    Some(text) => stdout_tee.emit(&text),
                    None => Ok(()),
                },
                OutputLine::Stderr(line) => {
                    push_tail(&mut stderr_tail, &line);
                    let (_, log) = stdout_tee.parts_mut();
                    if let Err(e) = log.write_all(line.as_bytes()) {
                        warn!(err = %e, "failed to write log sink");
                    }
                    let mut stderr = io::stderr().lock();
                    stderr.write_all(line.as_bytes()).and_then(|()| stderr.flush())
                }
            };
            if let Err(e) = result
                && write_failed.is_none()
            {
                write_failed = Some(e);
            }
        })
        .context("run assistant")?;

        if let Some(e) = write_failed {
            warn!(err = %e, "failed to write assistant output to terminal");
        }

        let report = ExecReport {
            success: exit.success(),
            exit_code: exit.exit_code(),
            timed_out: exit.timed_out,
            stderr: stderr_tail,
            result_error: decoder.into_result_error(),
        };
        debug!(success = report.success, timed_out = report.timed_out, exit_code = ?report.exit_code, "assistant finished");
        Ok(report)
    }
}

fn push_tail(tail: &mut String, line: &str) {
    tail.push_str(line);
    if tail.len() > STDERR_TAIL_BYTES {
        let mut cut = tail.len() - STDERR_TAIL_BYTES;
        while !tail.is_char_boundary(cut) {
            cut += 1;
        }
        tail.drain(..cut);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    fn request(workdir: &Path, command: &str, prompt: &str) -> ExecRequest {
        ExecRequest {
            workdir: workdir.to_path_buf(),
            prompt: prompt.to_string(),
            command: command.to_string(),
            flags: String::new(),
            timeout: Duration::from_secs(20),
        }
    }

    fn fake_assistant(dir: &Path, body: &str) -> String {
        let path = dir.join("fake-claude.sh");
        fs::write(&path, format!("#!/usr/bin/env bash\n{body}\n")).expect("write script");
        format!("bash {}", shell_quote(&path.display().to_string()))
    }

    #[test]
    fn command_line_quotes_prompt() {
        let req = ExecRequest {
            workdir: PathBuf::from("."),
            prompt: "it's here".to_string(),
            command: "claude".to_string(),
            flags: "--model sonnet".to_string(),
            timeout: Duration::ZERO,
        };
        assert_eq!(
            req.command_line(),
            format!("claude --model sonnet {STREAM_FLAGS} -p 'it'\"'\"'s here'")
        );
    }

    #[test]
    fn streams_decoded_text_to_output_and_log() {
        let temp = tempfile::tempdir().expect("tempdir");
        let body = r#"cat <<'EOF'
{"type":"stream_event","event":{"type":"content_block_delta","delta":{"type":"text_delta","text":"Hello"}}}
{"type":"stream_event","event":{"type":"content_block_delta","delta":{"type":"text_delta","text":" World"}}}
{"type":"stream_event","event":{"type":"message_stop"}}
{"type":"stream_event","event":{"type":"message_stop"}}
{"type":"stream_event","event":{"type":"content_block_delta","delta":{"type":"text_delta","text":"!"}}}
{"type":"stream_event","event":{"type":"message_stop"}}
EOF"#;
        let command = fake_assistant(temp.path(), body);
        let mut output = Vec::new();
        let mut log = Vec::new();
        let report = ClaudeExecutor
            .exec(&request(temp.path(), &command, "p"), &mut output, &mut log)
            .expect("exec");
        assert!(report.success);
        assert_eq!(String::from_utf8_lossy(&output), "Hello World\n!\n");
        assert_eq!(String::from_utf8_lossy(&log), "Hello World\n!\n");
    }

    #[test]
    fn stderr_is_logged_and_reported() {
        let temp = tempfile::tempdir().expect("tempdir");
        let command = fake_assistant(temp.path(), "echo 'API Error: rate limit' >&2\nexit 1");
        let mut output = Vec::new();
        let mut log = Vec::new();
        let report = ClaudeExecutor
            .exec(&request(temp.path(), &command, "p"), &mut output, &mut log)
            .expect("exec");
        assert!(!report.success);
        assert_eq!(report.exit_code, Some(1));
        assert!(report.stderr.contains("rate limit"));
        assert!(String::from_utf8_lossy(&log).contains("API Error: rate limit"));
        assert!(output.is_empty());
    }

    #[test]
    fn prompt_reaches_the_assistant() {
        let temp = tempfile::tempdir().expect("tempdir");
        let command = fake_assistant(temp.path(), r#"echo "${@: -1}""#);
        let mut output = Vec::new();
        let mut log = Vec::new();
        ClaudeExecutor
            .exec(
                &request(temp.path(), &command, "don't $EXPAND"),
                &mut output,
                &mut log,
            )
            .expect("exec");
        assert_eq!(String::from_utf8_lossy(&output), "don't $EXPAND\n");
    }

    #[test]
    fn timeout_is_reported_not_raised() {
        let temp = tempfile::tempdir().expect("tempdir");
        let command = fake_assistant(temp.path(), "sleep 30");
        let mut req = request(temp.path(), &command, "p");
        req.timeout = Duration::from_millis(200);
        let report = ClaudeExecutor
            .exec(&req, &mut Vec::new(), &mut Vec::new())
            .expect("exec");
        assert!(report.timed_out);
        assert!(!report.success);
    }

    #[test]
    fn stderr_tail_is_bounded() {
        let mut tail = String::new();
        for _ in 0..1000 {
            push_tail(&mut tail, &"é".repeat(20));
        }
        assert!(tail.len() <= STDERR_TAIL_BYTES);
        assert!(tail.starts_with('é'));
    }
}
