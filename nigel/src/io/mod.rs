//! I/O adapters for the nigel runner.

pub mod config;
pub mod environment;
pub mod executor;
pub mod git;
pub mod process;
pub mod source;
pub mod tee;
pub mod tracker;
pub mod transcript;
