//! Classification of a finished build attempt from its logs.
//!
//! One pass over build.log applies every pattern category to every line,
//! feeds translated requirements into the store, routes file-list lines to
//! the manifest and watches for the phase success markers. The result is an
//! [`AttemptOutcome`] the driver uses to decide whether to rebuild.

use std::collections::BTreeSet;

use tracing::{debug, error, info, warn};

use crate::core::cleanup::cleanup_requirement;
use crate::core::manifest::FileManifest;
use crate::core::patterns::{MatchEvent, PatternCategory, PatternRegistry};
use crate::core::requirements::RequirementStore;
use crate::core::root_log::unresolvable_names;
use crate::core::tables::NameTables;
use crate::core::types::{
    AttemptOutcome, AttemptState, FatalReason, PackageIdent, SYNTAX_ERROR_EXIT_CODE, ShortCircuit,
};

const UNPACKAGED_HEADER: &str = "Installed (but unpackaged) file(s) found:";
const UNPACKAGED_END_CONTAINS: &[&str] = &[
    "RPM build errors",
    "Childreturncodewas",
    "Child returncode",
    "Empty %files file",
];
const UNPACKAGED_END_STARTS: &[&str] = &["Building", "Child return code was"];
const SYNTAX_ERROR_PREFIX: &str =
    "Sorry: TabError: inconsistent use of tabs and spaces in indentation";
const CLEAN_MARKER: &str = "Executing(%clean";
const CHILD_OK_MARKER: &str = "Child return code was: 0";

/// Position relative to the installed-but-unpackaged listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnpackagedSection {
    Before,
    Inside,
    After,
}

/// Everything learned from one pass over build.log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildLogScan {
    /// Exit code after the syntax-error override.
    pub exit_code: i32,
    /// Whether the success marker for the requested phase was seen.
    pub success: bool,
    pub new_requirements: Vec<String>,
    pub manifest_changed: bool,
    /// Lines that matched a `failed-fatal` rule.
    pub fatal_lines: Vec<String>,
    /// Strings warned about for the first time during this scan.
    pub new_warnings: Vec<String>,
}

/// Session-scoped classifier: owns the pattern registry, the name tables and
/// the set of strings already warned about.
#[derive(Debug, Clone)]
pub struct LogClassifier {
    registry: PatternRegistry,
    tables: NameTables,
    package: PackageIdent,
    short_circuit: Option<ShortCircuit>,
    warned_about: BTreeSet<String>,
}

impl LogClassifier {
    pub fn new(
        registry: PatternRegistry,
        tables: NameTables,
        package: PackageIdent,
        short_circuit: Option<ShortCircuit>,
    ) -> Self {
        Self {
            registry,
            tables,
            package,
            short_circuit,
            warned_about: BTreeSet::new(),
        }
    }

    pub fn package(&self) -> &PackageIdent {
        &self.package
    }

    pub fn warned_about(&self) -> &BTreeSet<String> {
        &self.warned_about
    }

    /// Classify a finished attempt.
    ///
    /// Provisioning failures in `root_log` short-circuit the build-log scan.
    /// Banned content reported by the manifest is fatal regardless of anything else.
    pub fn classify<M: FileManifest + ?Sized>(
        &mut self,
        exit_code: i32,
        root_log: &str,
        build_log: &str,
        store: &mut RequirementStore,
        manifest: &mut M,
    ) -> AttemptOutcome {
        let unresolved = unresolvable_names(root_log, exit_code);
        let scan = if unresolved.is_empty() {
            self.scan_build_log(build_log, exit_code, store, manifest)
        } else {
            BuildLogScan {
                exit_code,
                ..BuildLogScan::default()
            }
        };

        let banned = manifest.banned_paths();
        let state = if !banned.is_empty() {
            AttemptState::Fatal {
                reason: FatalReason::BannedContent { paths: banned },
            }
        } else if !unresolved.is_empty() {
            AttemptState::Fatal {
                reason: FatalReason::Unresolvable { names: unresolved },
            }
        } else if !scan.new_requirements.is_empty() || scan.manifest_changed {
            AttemptState::RestartNeeded
        } else if scan.success {
            AttemptState::Success
        } else {
            AttemptState::Failed
        };

        match &state {
            AttemptState::Fatal { reason } => error!(%reason, "build attempt is fatal"),
            AttemptState::RestartNeeded => info!(
                new_requirements = scan.new_requirements.len(),
                manifest_changed = scan.manifest_changed,
                "build attempt needs a restart"
            ),
            AttemptState::Success => info!(phase = self.phase_label(), "build successful"),
            AttemptState::Failed => {
                warn!(exit_code = scan.exit_code, "build failed without new requirements");
            }
        }

        AttemptOutcome {
            exit_code: scan.exit_code,
            new_requirements: scan.new_requirements,
            manifest_changed: scan.manifest_changed,
            state,
        }
    }

    /// Single pass over build.log.
    pub fn scan_build_log<M: FileManifest + ?Sized>(
        &mut self,
        build_log: &str,
        exit_code: i32,
        store: &mut RequirementStore,
        manifest: &mut M,
    ) -> BuildLogScan {
        let mut scan = BuildLogScan {
            exit_code,
            ..BuildLogScan::default()
        };
        let scan_patterns = ShortCircuit::scans_patterns(self.short_circuit);
        let missing_prefix = format!("File not found: {}", self.package.buildroot_prefix());
        let mut section = UnpackagedSection::Before;

        for line in build_log.lines() {
            let line = line.trim_end_matches('\r');

            if scan_patterns {
                for event in self.registry.matches(line) {
                    apply_match(&event, &self.tables, &mut self.warned_about, store, &mut scan);
                }
            }

            if section == UnpackagedSection::Inside && ends_unpackaged_section(line) {
                section = UnpackagedSection::After;
            }
            if section == UnpackagedSection::Before && line.contains(UNPACKAGED_HEADER) {
                section = UnpackagedSection::Inside;
                manifest.begin_unpackaged(&self.package.name);
            } else if section == UnpackagedSection::Inside {
                let file = line.trim();
                if file.starts_with('/') {
                    debug!(file, "unpackaged file");
                    scan.manifest_changed |= manifest.push_file(file, &self.package.name);
                }
            }

            if line.starts_with(SYNTAX_ERROR_PREFIX) {
                warn!(line, "catastrophic syntax error in build log");
                scan.exit_code = SYNTAX_ERROR_EXIT_CODE;
            }

            if let Some((_, rest)) = line.split_once(missing_prefix.as_str()) {
                let missing = format!("/{}", rest.trim());
                scan.manifest_changed |= manifest.remove_file(&missing);
            }

            if scan.exit_code == 0 && self.is_success_marker(line) {
                scan.success = true;
            }
        }
        scan
    }

    fn is_success_marker(&self, line: &str) -> bool {
        match self.short_circuit {
            None | Some(ShortCircuit::Binary) => line.starts_with(CLEAN_MARKER),
            Some(ShortCircuit::Prep | ShortCircuit::Build | ShortCircuit::Install) => {
                line.starts_with(CHILD_OK_MARKER)
            }
        }
    }

    fn phase_label(&self) -> &'static str {
        self.short_circuit.map_or("full", ShortCircuit::as_str)
    }
}

fn apply_match(
    event: &MatchEvent<'_>,
    tables: &NameTables,
    warned_about: &mut BTreeSet<String>,
    store: &mut RequirementStore,
    scan: &mut BuildLogScan,
) {
    let rule = event.rule;
    match rule.category {
        PatternCategory::PkgConfig => {
            let Some(name) = rule.target.as_deref().or(event.first_group()) else {
                return;
            };
            if store.add_pkgconfig_buildreq(name) {
                scan.new_requirements.push(format!("pkgconfig({name})"));
            }
        }
        PatternCategory::Simple => {
            let Some(req) = rule.target.as_deref().or(event.first_group()) else {
                return;
            };
            if store.add_discovered_buildreq(req) {
                scan.new_requirements.push(req.trim().to_string());
            }
        }
        PatternCategory::Failed => apply_failed(event, tables, warned_about, store, scan),
        PatternCategory::FailedFatal => {
            warn!(line = event.raw_line, "build log contains fatal signature");
            scan.fatal_lines.push(event.raw_line.to_string());
        }
    }
}

/// Clean, filter and translate a generic "failed" match.
///
/// Ignored strings stop here, before anything can count as a change.
/// Translation failures are warned about once per session.
fn apply_failed(
    event: &MatchEvent<'_>,
    tables: &NameTables,
    warned_about: &mut BTreeSet<String>,
    store: &mut RequirementStore,
    scan: &mut BuildLogScan,
) {
    let Some(raw) = event.first_group() else {
        return;
    };
    let cleaned = cleanup_requirement(raw);
    if cleaned.is_empty() || store.is_ignored(&cleaned) {
        return;
    }
    match event
        .rule
        .translator()
        .translate(&cleaned, &event.groups, tables)
    {
        Ok(requirements) => {
            for requirement in &requirements {
                if let Some(id) = requirement.apply(store) {
                    scan.new_requirements.push(id);
                }
            }
        }
        Err(err) => {
            let subject = err.subject();
            if !subject.starts_with("--") && warned_about.insert(subject.to_string()) {
                warn!(%err, "cannot translate build log match");
                scan.new_warnings.push(subject.to_string());
            }
        }
    }
}

fn ends_unpackaged_section(line: &str) -> bool {
    UNPACKAGED_END_CONTAINS
        .iter()
        .any(|marker| line.contains(marker))
        || UNPACKAGED_END_STARTS
            .iter()
            .any(|marker| line.starts_with(marker))
}
