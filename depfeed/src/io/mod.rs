//! I/O helpers for build sessions: mock invocation, log files, config and caches.

pub mod build_logs;
pub mod cache;
pub mod config;
pub mod executor;
pub mod process;
pub mod spec_writer;
