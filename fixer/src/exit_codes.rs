//! Stable exit codes for fixer CLI commands.

/// Every phase succeeded, or a read-only command completed.
pub const OK: i32 = 0;
/// A phase ended without success, or the command failed with an error.
pub const FAILED: i32 = 1;
/// Interrupted by SIGINT/SIGTERM (128 + SIGINT).
pub const INTERRUPTED: i32 = 130;
