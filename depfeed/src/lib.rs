//! Log-driven build dependency discovery for mock-based RPM builds.
//!
//! A package is built, the build logs are scanned for evidence of missing
//! dependencies, the evidence is translated into distro requirement names, and
//! the build is re-run with the enlarged requirement set until it converges,
//! fails without news, hits something fatal, or runs out of rounds. The
//! architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (patterns, cleanup, translation,
//!   requirement accumulation, classification). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (mock invocation, log files, config,
//!   caches, requirement fragment). Isolated behind traits to enable scripted tests.
//!
//! [`attempt`] and [`looping`] coordinate the two into a build session.

pub mod attempt;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
