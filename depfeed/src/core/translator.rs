//! Per-ecosystem translation of build-log matches into requirement identifiers.
//!
//! Translation is split in two: [`Ecosystem::translate`] is a pure mapping
//! from captured text to [`Requirement`] values, and [`Requirement::apply`]
//! mutates the store and reports what actually changed.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::requirements::RequirementStore;
use crate::core::tables::NameTables;

/// Naming convention used to interpret a generic "failed" match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Ecosystem {
    /// Table lookup in `failed_commands`.
    #[default]
    Plain,
    #[serde(rename = "pkgconfig")]
    PkgConfig,
    #[serde(rename = "R", alias = "r")]
    R,
    Perl,
    #[serde(rename = "pypi")]
    PyPi,
    Ruby,
    /// Like `Ruby`, but only names present in the gem table are accepted.
    RubyTable,
    Maven,
    Gradle,
    Catkin,
}

/// A requirement derived from one match, before it touches the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// Plain build requirement.
    Build(String),
    /// `pkgconfig(<name>)` build requirement (plus the 32-bit form when enabled).
    PkgConfig(String),
    /// Build requirement that, when new, is also a run requirement of the main package.
    BuildAndRuntime(String),
}

/// Why a match could not be translated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslateError {
    /// The string is not in the `failed_commands` table.
    UnknownCommand(String),
    /// The string is not in the gem table (`ruby-table` rules only).
    UnknownGem(String),
}

impl fmt::Display for TranslateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranslateError::UnknownCommand(s) => write!(f, "unknown pattern match: {s}"),
            TranslateError::UnknownGem(s) => write!(f, "unknown ruby gem match: {s}"),
        }
    }
}

impl std::error::Error for TranslateError {}

impl TranslateError {
    pub fn subject(&self) -> &str {
        match self {
            TranslateError::UnknownCommand(s) | TranslateError::UnknownGem(s) => s,
        }
    }
}

impl Ecosystem {
    /// Translate a match into requirements.
    ///
    /// `cleaned` is capture group 1 after the cleanup transform. `groups` holds
    /// every capture group of the rule (group 1 first), raw; group count drives
    /// the Maven/Gradle shapes.
    pub fn translate(
        self,
        cleaned: &str,
        groups: &[Option<&str>],
        tables: &NameTables,
    ) -> Result<Vec<Requirement>, TranslateError> {
        let found = match self {
            Ecosystem::Plain => match tables.failed_commands.get(cleaned) {
                Some(req) if req.is_empty() => Vec::new(),
                Some(req) => vec![Requirement::Build(req.clone())],
                None => return Err(TranslateError::UnknownCommand(cleaned.to_string())),
            },
            Ecosystem::PkgConfig => vec![Requirement::PkgConfig(cleaned.to_string())],
            Ecosystem::R => vec![Requirement::BuildAndRuntime(format!("R-{cleaned}"))],
            Ecosystem::Perl => {
                vec![Requirement::Build(format!("perl({})", cleaned.replace("inc::", "")))]
            }
            Ecosystem::PyPi => {
                let name = tables.pypi_name(cleaned);
                if name.is_empty() {
                    Vec::new()
                } else {
                    vec![Requirement::Build(tables.pypi_name(&format!("{name}-python")))]
                }
            }
            Ecosystem::Ruby => match tables.gems.get(cleaned) {
                Some(pkg) => vec![Requirement::Build(pkg.clone())],
                None => vec![Requirement::Build(format!("rubygem-{cleaned}"))],
            },
            Ecosystem::RubyTable => match tables.gems.get(cleaned) {
                Some(pkg) => vec![Requirement::Build(pkg.clone())],
                None => return Err(TranslateError::UnknownGem(cleaned.to_string())),
            },
            Ecosystem::Maven | Ecosystem::Gradle => {
                vec![Requirement::Build(maven_requirement(cleaned, groups, tables))]
            }
            Ecosystem::Catkin => vec![
                Requirement::PkgConfig(cleaned.to_string()),
                Requirement::Build(cleaned.to_string()),
            ],
        };
        Ok(found)
    }
}

fn maven_requirement(cleaned: &str, groups: &[Option<&str>], tables: &NameTables) -> String {
    let group = |idx: usize| groups.get(idx).copied().flatten().unwrap_or_default();
    // Hyphens are not allowed in RPM versions.
    let version = |idx: usize| group(idx).replace('-', ".");

    if groups.len() == 2 {
        return format!("mvn({}) = {}", group(0), version(1));
    }
    if let Some(provide) = tables.maven_jars.get(cleaned) {
        return provide.clone();
    }
    if groups.len() == 3 {
        let artifact = group(1);
        let kind = if ["-parent", "-pom", "-bom"]
            .iter()
            .any(|suffix| artifact.ends_with(suffix))
        {
            "pom"
        } else {
            "jar"
        };
        return format!("mvn({}:{artifact}:{kind}) = {}", group(0), version(2));
    }
    format!("mvn-{cleaned}")
}

impl Requirement {
    /// Primary identifier this requirement adds.
    pub fn identifier(&self) -> String {
        match self {
            Requirement::Build(req) | Requirement::BuildAndRuntime(req) => req.clone(),
            Requirement::PkgConfig(name) => format!("pkgconfig({name})"),
        }
    }

    /// Apply to the store. Returns the identifier if the store grew.
    pub fn apply(&self, store: &mut RequirementStore) -> Option<String> {
        let added = match self {
            Requirement::Build(req) => store.add_discovered_buildreq(req),
            Requirement::PkgConfig(name) => store.add_pkgconfig_buildreq(name),
            Requirement::BuildAndRuntime(req) => {
                let added = store.add_discovered_buildreq(req);
                if added {
                    store.add_discovered_requires(req);
                }
                added
            }
        };
        added.then(|| self.identifier())
    }
}
