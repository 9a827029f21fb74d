//! Ordered registry of build-log signature patterns.
//!
//! Rules are configuration data: the crate ships a default set and callers
//! may append more. The registry is read-only once built.

use anyhow::{Context, Result, anyhow, bail};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::translator::Ecosystem;

const DEFAULT_PATTERNS: &str = include_str!("../../data/patterns.toml");

/// How a rule's match is turned into a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatternCategory {
    /// A fixed build requirement (or capture 1 verbatim).
    Simple,
    /// A fixed pkg-config module (or capture 1 verbatim).
    #[serde(rename = "pkgconfig")]
    PkgConfig,
    /// Capture 1 is cleaned and translated by the rule's ecosystem.
    Failed,
    /// Unrecoverable condition; the line is surfaced, nothing is derived.
    FailedFatal,
}

impl PatternCategory {
    /// Order in which categories are applied to each line.
    pub const SCAN_ORDER: [PatternCategory; 4] = [
        PatternCategory::PkgConfig,
        PatternCategory::Simple,
        PatternCategory::Failed,
        PatternCategory::FailedFatal,
    ];
}

/// Serialized form of a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternSpec {
    pub pattern: String,
    pub category: PatternCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ecosystem: Option<Ecosystem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PatternFile {
    #[serde(default, rename = "rule")]
    rules: Vec<PatternSpec>,
}

/// A compiled rule.
#[derive(Debug, Clone)]
pub struct PatternRule {
    pub expression: Regex,
    pub category: PatternCategory,
    pub ecosystem: Option<Ecosystem>,
    pub target: Option<String>,
}

/// One rule matching one line.
#[derive(Debug, Clone)]
pub struct MatchEvent<'a> {
    pub raw_line: &'a str,
    pub rule: &'a PatternRule,
    /// Capture groups 1..n (group 0 excluded); `None` for groups that did not participate.
    pub groups: Vec<Option<&'a str>>,
}

impl MatchEvent<'_> {
    pub fn first_group(&self) -> Option<&str> {
        self.groups.first().copied().flatten()
    }
}

impl PatternRule {
    pub fn compile(spec: &PatternSpec) -> Result<Self> {
        let expression = Regex::new(&spec.pattern)
            .with_context(|| format!("compile pattern `{}`", spec.pattern))?;
        let groups = expression.captures_len() - 1;
        match spec.category {
            PatternCategory::Simple | PatternCategory::PkgConfig
                if spec.target.is_none() && groups == 0 =>
            {
                bail!(
                    "pattern `{}` needs a target or a capture group",
                    spec.pattern
                );
            }
            PatternCategory::Failed if groups == 0 => {
                bail!("failed pattern `{}` needs a capture group", spec.pattern);
            }
            _ => {}
        }
        Ok(Self {
            expression,
            category: spec.category,
            ecosystem: spec.ecosystem,
            target: spec.target.clone(),
        })
    }

    pub fn match_line<'a>(&'a self, line: &'a str) -> Option<MatchEvent<'a>> {
        let caps = self.expression.captures(line)?;
        let groups = (1..caps.len())
            .map(|idx| caps.get(idx).map(|m| m.as_str()))
            .collect();
        Some(MatchEvent {
            raw_line: line,
            rule: self,
            groups,
        })
    }

    /// Ecosystem used to translate a `failed` match; untagged rules are plain lookups.
    pub fn translator(&self) -> Ecosystem {
        self.ecosystem.unwrap_or_default()
    }
}

/// Ordered collection of compiled rules.
#[derive(Debug, Clone, Default)]
pub struct PatternRegistry {
    rules: Vec<PatternRule>,
}

impl PatternRegistry {
    /// Rules shipped with the crate.
    pub fn builtin() -> Result<Self> {
        Self::from_toml(DEFAULT_PATTERNS).context("load builtin patterns")
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let file: PatternFile = toml::from_str(raw).context("parse pattern file")?;
        Self::from_specs(&file.rules)
    }

    pub fn from_specs(specs: &[PatternSpec]) -> Result<Self> {
        let rules = specs
            .iter()
            .enumerate()
            .map(|(idx, spec)| {
                PatternRule::compile(spec).map_err(|err| anyhow!("rule #{}: {err:#}", idx + 1))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Append rules after the existing ones.
    pub fn extend(&mut self, other: PatternRegistry) {
        self.rules.extend(other.rules);
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> impl Iterator<Item = &PatternRule> {
        self.rules.iter()
    }

    pub fn by_category(&self, category: PatternCategory) -> impl Iterator<Item = &PatternRule> {
        self.rules
            .iter()
            .filter(move |rule| rule.category == category)
    }

    /// Every rule matching `line`, category by category in [`PatternCategory::SCAN_ORDER`].
    pub fn matches<'a>(&'a self, line: &'a str) -> Vec<MatchEvent<'a>> {
        PatternCategory::SCAN_ORDER
            .iter()
            .flat_map(|category| self.by_category(*category))
            .filter_map(|rule| rule.match_line(line))
            .collect()
    }
}
