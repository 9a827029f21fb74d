//! Session configuration stored in `depfeed.toml`.

use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::patterns::PatternRegistry;
use crate::core::requirements::RequirementPolicy;
use crate::core::tables::NameTables;

/// Default config file name, looked up in the package working directory.
pub const CONFIG_FILE: &str = "depfeed.toml";

/// Depfeed configuration (TOML).
///
/// Missing fields default to the values the build loop has always used.
/// Relative paths are resolved against the package working directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DepfeedConfig {
    /// Stop re-driving the build after this many rounds.
    pub max_rounds: u32,

    /// Wall-clock limit for one mock invocation, in seconds.
    pub build_timeout_secs: u64,

    /// Truncate captured mock stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Directory mock writes its logs and packages to.
    pub results_dir: PathBuf,

    /// Also require 32-bit pkg-config modules.
    pub build_32bit: bool,

    pub banned_buildreqs: Vec<String>,
    pub banned_requires: Vec<String>,

    /// Cleaned log strings that are known noise.
    pub ignored: Vec<String>,

    /// Distro package names run requirements must belong to (empty: no filter).
    pub known_packages: Vec<String>,

    /// Path prefixes no packaged file may live under.
    pub banned_paths: Vec<String>,

    /// Extra pattern rules appended after the builtin set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patterns_file: Option<PathBuf>,

    /// Name tables overlaid on the builtin tables.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tables_file: Option<PathBuf>,

    /// Where discovered requirements are cached between sessions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_path: Option<PathBuf>,

    pub mock: MockConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MockConfig {
    /// Command used to invoke mock (e.g. `["sudo", "/usr/bin/mock"]`).
    pub command: Vec<String>,
    /// Value passed as `--root=`.
    pub root: String,
    /// Extra options appended to every mock invocation.
    pub opts: Vec<String>,
    /// Pass `--cleanup-after` instead of `--no-cleanup-after`.
    pub cleanup: bool,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            command: vec!["sudo".to_string(), "/usr/bin/mock".to_string()],
            root: "clear".to_string(),
            opts: Vec::new(),
            cleanup: false,
        }
    }
}

impl Default for DepfeedConfig {
    fn default() -> Self {
        Self {
            max_rounds: 20,
            build_timeout_secs: 4 * 60 * 60,
            output_limit_bytes: 1_000_000,
            results_dir: PathBuf::from("results"),
            build_32bit: false,
            banned_buildreqs: Vec::new(),
            banned_requires: Vec::new(),
            ignored: Vec::new(),
            known_packages: Vec::new(),
            banned_paths: Vec::new(),
            patterns_file: None,
            tables_file: None,
            cache_path: None,
            mock: MockConfig::default(),
        }
    }
}

impl DepfeedConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_rounds == 0 {
            return Err(anyhow!("max_rounds must be > 0"));
        }
        if self.build_timeout_secs == 0 {
            return Err(anyhow!("build_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.mock.command.is_empty() || self.mock.command[0].trim().is_empty() {
            return Err(anyhow!("mock.command must be a non-empty array"));
        }
        if self.banned_paths.iter().any(|prefix| !prefix.starts_with('/')) {
            return Err(anyhow!("banned_paths entries must be absolute"));
        }
        Ok(())
    }

    pub fn requirement_policy(&self) -> RequirementPolicy {
        RequirementPolicy {
            banned_buildreqs: self.banned_buildreqs.iter().cloned().collect(),
            banned_requires: self.banned_requires.iter().cloned().collect(),
            ignored: self.ignored.iter().cloned().collect(),
            known_packages: self.known_packages.iter().cloned().collect(),
            build_32bit: self.build_32bit,
        }
    }

    /// Builtin rules followed by `patterns_file`, if configured.
    pub fn load_registry(&self, workdir: &Path) -> Result<PatternRegistry> {
        let mut registry = PatternRegistry::builtin()?;
        if let Some(path) = &self.patterns_file {
            let path = resolve(workdir, path);
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("read patterns {}", path.display()))?;
            let extra = PatternRegistry::from_toml(&raw)
                .with_context(|| format!("load patterns {}", path.display()))?;
            debug!(rules = extra.len(), path = %path.display(), "loaded extra patterns");
            registry.extend(extra);
        }
        Ok(registry)
    }

    /// Builtin tables overlaid with `tables_file`, if configured.
    pub fn load_tables(&self, workdir: &Path) -> Result<NameTables> {
        let mut tables = NameTables::builtin()?;
        if let Some(path) = &self.tables_file {
            let path = resolve(workdir, path);
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("read name tables {}", path.display()))?;
            let overlay = NameTables::from_toml(&raw)
                .with_context(|| format!("parse name tables {}", path.display()))?;
            tables.merge(overlay);
        }
        Ok(tables)
    }

    /// Resolved results directory. It may be the workdir itself or live inside
    /// it, but never above it.
    pub fn results_dir(&self, workdir: &Path) -> Result<PathBuf> {
        if self
            .results_dir
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            bail!(
                "results_dir {} must not contain `..`; use an absolute path",
                self.results_dir.display()
            );
        }
        let dir = resolve(workdir, &self.results_dir);
        if workdir.starts_with(&dir) && dir != workdir {
            bail!(
                "results_dir {} contains the workdir {}",
                dir.display(),
                workdir.display()
            );
        }
        Ok(dir)
    }

    pub fn cache_path(&self, workdir: &Path) -> Option<PathBuf> {
        self.cache_path.as_deref().map(|path| resolve(workdir, path))
    }
}

fn resolve(workdir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workdir.join(path)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `DepfeedConfig::default()`.
pub fn load_config(path: &Path) -> Result<DepfeedConfig> {
    if !path.exists() {
        let cfg = DepfeedConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: DepfeedConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &DepfeedConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
