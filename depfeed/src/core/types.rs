//! Shared deterministic types for the build-log core.
//!
//! These types are the contract between the classifier, the driver and the
//! outside world (CLI output, round meta files). They carry no I/O.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Effective exit code used when the build log shows a catastrophic
/// interpreter syntax error.
pub const SYNTAX_ERROR_EXIT_CODE: i32 = 99;

/// Partial-build mode selected by the caller (`--short-circuit=<phase>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShortCircuit {
    Prep,
    Build,
    Install,
    Binary,
}

impl ShortCircuit {
    pub fn as_str(self) -> &'static str {
        match self {
            ShortCircuit::Prep => "prep",
            ShortCircuit::Build => "build",
            ShortCircuit::Install => "install",
            ShortCircuit::Binary => "binary",
        }
    }

    /// Whether dependency patterns are scanned for this phase.
    pub fn scans_patterns(phase: Option<Self>) -> bool {
        !matches!(phase, Some(ShortCircuit::Prep | ShortCircuit::Binary))
    }
}

impl fmt::Display for ShortCircuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShortCircuit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prep" => Ok(ShortCircuit::Prep),
            "build" => Ok(ShortCircuit::Build),
            "install" => Ok(ShortCircuit::Install),
            "binary" => Ok(ShortCircuit::Binary),
            other => Err(format!(
                "unknown short-circuit phase `{other}` (expected prep, build, install or binary)"
            )),
        }
    }
}

/// Name, version and release of the package being built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageIdent {
    pub name: String,
    pub version: String,
    pub release: String,
}

impl PackageIdent {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        release: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            release: release.into(),
        }
    }

    /// `<name>-<version>-<release>`
    pub fn nvr(&self) -> String {
        format!("{}-{}-{}", self.name, self.version, self.release)
    }

    /// Prefix of buildroot paths reported by rpmbuild inside the chroot.
    pub fn buildroot_prefix(&self) -> String {
        format!("/builddir/build/BUILDROOT/{}.x86_64/", self.nvr())
    }
}

/// Why an attempt ended the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FatalReason {
    /// The chroot package manager could not resolve these names before the build started.
    Unresolvable { names: Vec<String> },
    /// The file manifest saw content under a banned path.
    BannedContent { paths: Vec<String> },
    /// The executor finished without producing a build log.
    MissingBuildLog { path: String },
}

impl fmt::Display for FatalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FatalReason::Unresolvable { names } => {
                write!(f, "cannot resolve dependency name: {}", names.join(", "))
            }
            FatalReason::BannedContent { paths } => {
                write!(f, "content in banned paths found: {}", paths.join(", "))
            }
            FatalReason::MissingBuildLog { path } => write!(
                f,
                "mock command failed, results log {path} does not exist (check permissions)"
            ),
        }
    }
}

/// Terminal state of one build attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AttemptState {
    /// The success markers for the requested phase were seen and nothing changed.
    Success,
    /// New requirements or manifest changes were found; rebuild with the enlarged set.
    RestartNeeded,
    /// Unrecoverable; stop issuing attempts.
    Fatal { reason: FatalReason },
    /// Nothing new was learned and the build did not succeed.
    Failed,
}

/// Result of classifying one build attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptOutcome {
    /// Exit code after any syntax-error override.
    pub exit_code: i32,
    /// Identifiers added to the requirement store during this attempt.
    pub new_requirements: Vec<String>,
    /// Whether the file manifest changed (files pushed or removed).
    pub manifest_changed: bool,
    pub state: AttemptState,
}

impl AttemptOutcome {
    /// True iff at least one new identifier was added during this attempt.
    pub fn changed(&self) -> bool {
        !self.new_requirements.is_empty()
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self.state, AttemptState::Fatal { .. })
    }
}
