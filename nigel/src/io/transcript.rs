//! Transcript log of assistant invocations (`<task dir>/claude.log`).

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;

pub const TRANSCRIPT_FILE_NAME: &str = "claude.log";

const SEPARATOR_WIDTH: usize = 80;

fn separator() -> String {
    "=".repeat(SEPARATOR_WIDTH)
}

/// Render the header written before an invocation's output.
pub fn entry_header(timestamp: &str, prompt: &str) -> String {
    let sep = separator();
    format!("\n{sep}\nTimestamp: {timestamp}\nPrompt: {prompt}\n{sep}\n")
}

/// Append-only transcript file. Implements [`Write`] for streamed output.
#[derive(Debug)]
pub struct Transcript {
    file: File,
}

impl Transcript {
    pub fn open(task_dir: &Path) -> Result<Self> {
        let path = task_dir.join(TRANSCRIPT_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open transcript {}", path.display()))?;
        Ok(Self { file })
    }

    pub fn start_entry(&mut self, prompt: &str) -> io::Result<()> {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        self.file
            .write_all(entry_header(&timestamp, prompt).as_bytes())
    }

    pub fn end_entry(&mut self) -> io::Result<()> {
        writeln!(self.file, "{}", separator())
    }
}

impl Write for Transcript {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}
