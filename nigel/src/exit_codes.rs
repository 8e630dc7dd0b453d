//! Stable exit codes for the nigel CLI.

/// The run finished (exhausted, or stopped by a limit).
pub const OK: i32 = 0;
/// Invalid arguments, configuration, or a fatal runtime error.
pub const INVALID: i32 = 1;
/// Stopped by SIGINT or SIGTERM; running assistant process groups were killed.
pub const INTERRUPTED: i32 = 130;
