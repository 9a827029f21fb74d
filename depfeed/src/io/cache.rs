//! Requirement cache load/save with schema validation.
//!
//! Requirements discovered in one session are saved so the next session of the
//! same package starts with them and skips the rounds that found them.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::core::requirements::DiscoveredRequirements;

pub const CACHE_VERSION: u32 = 1;

const CACHE_SCHEMA: &str = include_str!("../../schemas/requirement_cache.schema.json");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementCache {
    pub version: u32,
    pub package: String,
    pub discovered: DiscoveredRequirements,
}

impl RequirementCache {
    pub fn new(package: impl Into<String>, discovered: DiscoveredRequirements) -> Self {
        Self {
            version: CACHE_VERSION,
            package: package.into(),
            discovered,
        }
    }
}

/// Load a cache file. Returns `Ok(None)` when the file does not exist.
///
/// A cache recorded for a different package is ignored with a warning.
pub fn load_cache(path: &Path, package: &str) -> Result<Option<RequirementCache>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read cache {}", path.display()))?;
    let value: Value = serde_json::from_str(&contents)
        .with_context(|| format!("parse cache {}", path.display()))?;
    validate_cache(&value).with_context(|| format!("validate cache {}", path.display()))?;
    let cache: RequirementCache = serde_json::from_value(value)
        .with_context(|| format!("deserialize cache {}", path.display()))?;
    if cache.package != package {
        warn!(
            cached = %cache.package,
            package,
            "requirement cache belongs to another package, ignoring"
        );
        return Ok(None);
    }
    debug!(
        buildreqs = cache.discovered.buildreqs.len(),
        requires = cache.discovered.requires.len(),
        "loaded requirement cache"
    );
    Ok(Some(cache))
}

/// Atomically write the cache (temp file + rename).
pub fn write_cache(path: &Path, cache: &RequirementCache) -> Result<()> {
    let value = serde_json::to_value(cache)?;
    validate_cache(&value)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create cache dir {}", parent.display()))?;
    }
    let mut buf = serde_json::to_string_pretty(&value)?;
    buf.push('\n');
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, buf).with_context(|| format!("write {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace cache {}", path.display()))
}

fn validate_cache(value: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(CACHE_SCHEMA).context("parse cache schema")?;
    let compiled = validator_for(&schema).map_err(|err| anyhow!("invalid schema: {}", err))?;
    if !compiled.is_valid(value) {
        let messages = compiled
            .iter_errors(value)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "cache schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}
