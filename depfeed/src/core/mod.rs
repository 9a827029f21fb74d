//! Deterministic, pure logic for build-log classification.
//!
//! Core modules must be free of I/O side effects. They operate on log text and
//! in-memory data structures and return deterministic outputs suitable for tests.

pub mod classifier;
pub mod cleanup;
pub mod manifest;
pub mod patterns;
pub mod requirements;
pub mod root_log;
pub mod tables;
pub mod translator;
pub mod types;
