//! Persistent ignore list (`<task dir>/ignored.log`).
//!
//! The file is append-only, one key per line, in write order. It is read once
//! at construction; afterwards the in-memory map is authoritative and only
//! terminal (`Done`) transitions are appended. No locking: one writer per
//! task directory is assumed.
//!
//! Lines are trimmed on load, so a key that is empty, starts with `"`, has
//! surrounding whitespace or spans lines is stored as a JSON string literal.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, instrument};

use crate::core::attempts::AttemptState;

pub const IGNORED_FILE_NAME: &str = "ignored.log";

/// File-system failure on the ignore list. Fatal to the run: skip state
/// would otherwise be unreliable.
#[derive(Debug, Error)]
pub enum TrackerIoError {
    #[error("failed to read ignored list {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write ignored list {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Ignored / attempt tracker for one task.
#[derive(Debug)]
pub struct IgnoredList {
    path: PathBuf,
    entries: HashMap<String, AttemptState>,
    max_repeat: u32,
}

impl IgnoredList {
    /// Load `ignored.log` from `task_dir`. A missing file is an empty list.
    #[instrument(skip_all, fields(task_dir = %task_dir.display()))]
    pub fn load(task_dir: &Path) -> Result<Self, TrackerIoError> {
        let path = task_dir.join(IGNORED_FILE_NAME);
        let entries = match fs::read_to_string(&path) {
            Ok(contents) => contents
                .lines()
                .filter_map(decode_line)
                .map(|key| (key, AttemptState::Done))
                .collect(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(source) => return Err(TrackerIoError::Read { path, source }),
        };
        debug!(entries = entries.len(), "ignored list loaded");
        Ok(Self {
            path,
            entries,
            max_repeat: 0,
        })
    }

    /// Enable repeat mode (`n > 0`): a key is skipped only after `n` attempts.
    ///
    /// Entries already on disk stay skipped.
    pub fn set_max_repeat(&mut self, n: u32) {
        self.max_repeat = n;
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state(key).is_exhausted(self.max_repeat)
    }

    pub fn state(&self, key: &str) -> AttemptState {
        self.entries.get(key).copied().unwrap_or_default()
    }

    /// Record one attempt of `key`, appending it to disk once it is exhausted.
    #[instrument(skip(self), fields(max_repeat = self.max_repeat))]
    pub fn add(&mut self, key: &str) -> Result<(), TrackerIoError> {
        let transition = self.state(key).record(self.max_repeat);
        if transition.persist {
            self.append(key)?;
            debug!("key persisted to ignored list");
        }
        self.entries.insert(key.to_string(), transition.next);
        Ok(())
    }

    fn append(&self, key: &str) -> Result<(), TrackerIoError> {
        let write_err = |source| TrackerIoError::Write {
            path: self.path.clone(),
            source,
        };
        let line = encode_key(key).map_err(|e| write_err(io::Error::from(e)))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(write_err)?;
        writeln!(file, "{line}").map_err(write_err)
    }
}

fn encode_key(key: &str) -> serde_json::Result<String> {
    let plain = !key.is_empty()
        && !key.starts_with('"')
        && key.trim() == key
        && !key.contains(['\n', '\r']);
    if plain {
        Ok(key.to_string())
    } else {
        serde_json::to_string(key)
    }
}

fn decode_line(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if line.starts_with('"')
        && let Ok(key) = serde_json::from_str::<String>(line)
    {
        return Some(key);
    }
    Some(line.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_file(contents: &str) -> (tempfile::TempDir, IgnoredList) {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join(IGNORED_FILE_NAME), contents).expect("write ignored");
        let list = IgnoredList::load(temp.path()).expect("load");
        (temp, list)
    }

    fn read_file(dir: &Path) -> String {
        fs::read_to_string(dir.join(IGNORED_FILE_NAME)).expect("read ignored")
    }

    #[test]
    fn contains_loaded_entries() {
        let (_temp, list) = with_file("file1.go\n  file2.go  \n\n");
        assert!(list.contains("file1.go"));
        assert!(list.contains("file2.go"));
        assert!(!list.contains("file3.go"));
    }

    #[test]
    fn missing_file_is_empty_list() {
        let temp = tempfile::tempdir().expect("tempdir");
        let list = IgnoredList::load(temp.path()).expect("load");
        assert!(!list.contains("anything"));
        assert!(!temp.path().join(IGNORED_FILE_NAME).exists());
    }

    #[test]
    fn unreadable_path_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::create_dir(temp.path().join(IGNORED_FILE_NAME)).expect("mkdir");
        let err = IgnoredList::load(temp.path()).unwrap_err();
        assert!(matches!(err, TrackerIoError::Read { .. }));
    }

    #[test]
    fn add_appends_once() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut list = IgnoredList::load(temp.path()).expect("load");
        list.add("newfile.go").expect("add");
        list.add("newfile.go").expect("add again");
        assert!(list.contains("newfile.go"));
        assert_eq!(read_file(temp.path()), "newfile.go\n");
    }

    #[test]
    fn add_does_not_duplicate_loaded_entries() {
        let (temp, mut list) = with_file("a\n");
        list.add("a").expect("add");
        list.add("b").expect("add");
        assert_eq!(read_file(temp.path()), "a\nb\n");
    }

    #[test]
    fn repeat_mode_treats_existing_entries_as_done() {
        let (_temp, mut list) = with_file("func1\nfunc2\n");
        assert!(list.contains("func1"));
        list.set_max_repeat(3);
        assert!(list.contains("func1"));
        assert!(list.contains("func2"));
        assert!(!list.contains("func3"));
    }

    #[test]
    fn repeat_mode_persists_only_when_exhausted() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut list = IgnoredList::load(temp.path()).expect("load");
        list.set_max_repeat(3);
        assert!(!list.contains("retryFunc"));

        list.add("retryFunc").expect("add 1");
        assert!(!list.contains("retryFunc"));
        list.add("retryFunc").expect("add 2");
        assert!(!list.contains("retryFunc"));
        assert!(!temp.path().join(IGNORED_FILE_NAME).exists());

        list.add("retryFunc").expect("add 3");
        assert!(list.contains("retryFunc"));
        assert_eq!(read_file(temp.path()), "retryFunc\n");

        let mut reloaded = IgnoredList::load(temp.path()).expect("reload");
        reloaded.set_max_repeat(3);
        assert!(reloaded.contains("retryFunc"));
    }

    #[test]
    fn max_repeat_zero_is_simple_mode() {
        let (_temp, mut list) = with_file("func1\n");
        list.set_max_repeat(0);
        assert!(list.contains("func1"));
        assert!(!list.contains("func2"));
    }

    #[test]
    fn awkward_keys_survive_a_reload() {
        let keys = ["line one\nline two", " padded ", "\"quoted\"", "", "crlf\r\n"];
        let temp = tempfile::tempdir().expect("tempdir");
        let mut list = IgnoredList::load(temp.path()).expect("load");
        for key in keys {
            list.add(key).expect("add");
        }
        list.add("plain.go").expect("add plain");

        let reloaded = IgnoredList::load(temp.path()).expect("reload");
        for key in keys {
            assert!(reloaded.contains(key), "{key:?}");
        }
        assert!(reloaded.contains("plain.go"));
        assert!(!reloaded.contains("line one"));
        assert!(!reloaded.contains("padded"));
        assert_eq!(reloaded.entries.len(), keys.len() + 1);
        assert!(read_file(temp.path()).ends_with("\nplain.go\n"));
    }

    #[test]
    fn write_failure_is_reported() {
        let temp = tempfile::tempdir().expect("tempdir");
        let task_dir = temp.path().join("task");
        fs::create_dir(&task_dir).expect("mkdir");
        let mut list = IgnoredList::load(&task_dir).expect("load");
        fs::remove_dir(&task_dir).expect("rmdir");
        let err = list.add("k").unwrap_err();
        assert!(matches!(err, TrackerIoError::Write { .. }));
        assert!(!list.contains("k"));
    }
}
