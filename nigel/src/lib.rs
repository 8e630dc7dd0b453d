//! Task-automation loop that drives an AI coding assistant over a list of
//! candidates.
//!
//! Each task lives in `nigel/<task>/` and names a candidate source command,
//! a prompt template, and optional verification and commit commands. The
//! runner repeatedly picks the first candidate not yet ignored, expands the
//! prompt for it, runs the assistant, and records the outcome in the task's
//! `ignored.log`. The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (parsing, partitioning,
//!   interpolation, classification, backoff). No I/O.
//! - **[`io`]**: Side-effecting operations (processes, files, git).
//!   Isolated behind traits so tests can script them.
//!
//! [`runner`] coordinates the two.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod runner;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
