//! Static name tables used by the requirement translator.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_TABLES: &str = include_str!("../../data/tables.toml");

/// Lookup data that maps log vocabulary onto distro package names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NameTables {
    pub failed_commands: BTreeMap<String, String>,
    pub gems: BTreeMap<String, String>,
    pub maven_jars: BTreeMap<String, String>,
    pub pypi_names: BTreeMap<String, String>,
}

impl NameTables {
    /// Tables shipped with the crate.
    pub fn builtin() -> Result<Self> {
        Self::from_toml(DEFAULT_TABLES).context("parse builtin name tables")
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let tables: NameTables = toml::from_str(raw)?;
        Ok(tables)
    }

    /// Overlay `other` on top of `self`; entries in `other` win.
    pub fn merge(&mut self, other: NameTables) {
        self.failed_commands.extend(other.failed_commands);
        self.gems.extend(other.gems);
        self.maven_jars.extend(other.maven_jars);
        self.pypi_names.extend(other.pypi_names);
    }

    /// Map a PyPI name onto the distro's spelling; unknown names pass through.
    pub fn pypi_name(&self, name: &str) -> String {
        self.pypi_names
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_tables_parse() {
        let tables = NameTables::builtin().expect("builtin tables");
        assert_eq!(tables.failed_commands.get("flex").map(String::as_str), Some("flex"));
        assert_eq!(tables.failed_commands.get("Threads").map(String::as_str), Some(""));
        assert!(!tables.gems.is_empty());
    }

    #[test]
    fn merge_overrides_existing_entries() {
        let mut tables = NameTables::builtin().expect("builtin tables");
        let overlay = NameTables::from_toml("[failed_commands]\nflex = \"flex-dev\"\n").expect("overlay");
        tables.merge(overlay);
        assert_eq!(tables.failed_commands["flex"], "flex-dev");
    }

    #[test]
    fn pypi_name_passes_unknown_names_through() {
        let tables = NameTables::builtin().expect("builtin tables");
        assert_eq!(tables.pypi_name("requests"), "requests");
        assert_eq!(tables.pypi_name("PyYAML"), "pyyaml");
    }
}
