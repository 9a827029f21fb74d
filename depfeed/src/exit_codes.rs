//! Stable exit codes for depfeed CLI commands.

/// The build succeeded (or `scan` classified an attempt that needs no escalation).
pub const OK: i32 = 0;
/// Invalid arguments, config, cache or logs, or the build backend could not be driven.
pub const INVALID: i32 = 1;
/// An attempt hit an unrecoverable condition (unresolvable dependency, banned content,
/// missing build log).
pub const FATAL: i32 = 2;
/// The build failed and the logs offered nothing new to try.
pub const FAILED: i32 = 3;
/// `depfeed build` used every allowed round without converging.
pub const CAP: i32 = 4;
