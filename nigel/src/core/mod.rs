//! Deterministic, pure logic shared by the nigel runner.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod attempts;
pub mod backoff;
pub mod budget;
pub mod candidate;
pub mod canonical;
pub mod classifier;
pub mod command;
pub mod duration;
pub mod errors;
pub mod interpolate;
pub mod partition;
pub mod stream;
pub mod types;
