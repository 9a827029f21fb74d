//! Accumulating, deduplicated build/run requirement sets for one package session.
//!
//! Every `add_*` operation is idempotent and reports whether the store grew.
//! The store never shrinks; callers aggregate the returned booleans to decide
//! whether a rebuild is warranted.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Subpackage key used when no subpackage is named.
pub const MAIN_SUBPACKAGE: &str = "main";

/// Static policy applied to every addition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequirementPolicy {
    /// Build requirements that must never be added.
    pub banned_buildreqs: BTreeSet<String>,
    /// Run requirements that must never be added.
    pub banned_requires: BTreeSet<String>,
    /// Cleaned log strings that are known noise and never reach translation.
    pub ignored: BTreeSet<String>,
    /// Distro package names; when non-empty, run requirements outside this set are skipped.
    pub known_packages: BTreeSet<String>,
    /// Also require the `pkgconfig(32<name>)` form for pkg-config requirements.
    pub build_32bit: bool,
}

/// Build requirements, per-subpackage run requirements and provides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequirementStore {
    policy: RequirementPolicy,
    buildreqs: BTreeSet<String>,
    requires: BTreeMap<String, BTreeSet<String>>,
    provides: BTreeMap<String, BTreeSet<String>>,
    discovered: DiscoveredRequirements,
}

/// Identifiers learned from build logs, kept apart so they can be cached across sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredRequirements {
    pub buildreqs: BTreeSet<String>,
    pub requires: BTreeSet<String>,
}

impl RequirementStore {
    pub fn new(policy: RequirementPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn is_ignored(&self, cleaned: &str) -> bool {
        self.policy.ignored.contains(cleaned)
    }

    /// Add a build requirement. Returns `true` iff the store grew.
    pub fn add_buildreq(&mut self, req: &str) -> bool {
        let req = req.trim();
        if req.is_empty() {
            return false;
        }
        if self.policy.banned_buildreqs.contains(req) {
            debug!(req, "skipping banned buildreq");
            return false;
        }
        if !self.buildreqs.insert(req.to_string()) {
            return false;
        }
        info!(req, "adding buildreq");
        true
    }

    /// Add a build requirement learned from a build log (also recorded for caching).
    pub fn add_discovered_buildreq(&mut self, req: &str) -> bool {
        let added = self.add_buildreq(req);
        if added {
            self.discovered.buildreqs.insert(req.trim().to_string());
        }
        added
    }

    /// Add `pkgconfig(<name>)`, plus `pkgconfig(32<name>)` when 32-bit builds are enabled.
    pub fn add_pkgconfig_buildreq(&mut self, name: &str) -> bool {
        let mut added = false;
        if self.policy.build_32bit {
            added |= self.add_discovered_buildreq(&format!("pkgconfig(32{name})"));
        }
        added |= self.add_discovered_buildreq(&format!("pkgconfig({name})"));
        added
    }

    /// Add a run requirement to `subpackage` (defaults to [`MAIN_SUBPACKAGE`]).
    ///
    /// Returns `true` iff the store grew.
    pub fn add_requires(&mut self, req: &str, subpackage: Option<&str>) -> bool {
        let req = req.trim();
        if req.is_empty() || self.policy.banned_requires.contains(req) {
            return false;
        }
        if !self.policy.known_packages.is_empty() && !self.policy.known_packages.contains(req) {
            debug!(req, "requirement is not a known package, skipping");
            return false;
        }
        let key = subpackage.unwrap_or(MAIN_SUBPACKAGE).to_string();
        let added = self.requires.entry(key).or_default().insert(req.to_string());
        if added {
            info!(req, subpackage = subpackage.unwrap_or(MAIN_SUBPACKAGE), "adding requirement");
        }
        added
    }

    /// Add a run requirement learned from a build log.
    pub fn add_discovered_requires(&mut self, req: &str) -> bool {
        let added = self.add_requires(req, None);
        if added {
            self.discovered.requires.insert(req.trim().to_string());
        }
        added
    }

    /// Add a provided capability to `subpackage` (defaults to [`MAIN_SUBPACKAGE`]).
    pub fn add_provides(&mut self, capability: &str, subpackage: Option<&str>) -> bool {
        let capability = capability.trim();
        if capability.is_empty() {
            return false;
        }
        let key = subpackage.unwrap_or(MAIN_SUBPACKAGE).to_string();
        self.provides
            .entry(key)
            .or_default()
            .insert(capability.to_string())
    }

    /// Seed the store from a previous session's discoveries. Returns the number of additions.
    pub fn seed(&mut self, cached: &DiscoveredRequirements) -> usize {
        let mut added = 0;
        for req in &cached.buildreqs {
            added += usize::from(self.add_discovered_buildreq(req));
        }
        for req in &cached.requires {
            added += usize::from(self.add_discovered_requires(req));
        }
        added
    }

    pub fn buildreqs(&self) -> &BTreeSet<String> {
        &self.buildreqs
    }

    pub fn requires(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.requires
    }

    pub fn provides(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.provides
    }

    pub fn discovered(&self) -> &DiscoveredRequirements {
        &self.discovered
    }

    pub fn has_buildreq(&self, req: &str) -> bool {
        self.buildreqs.contains(req)
    }

    pub fn has_requires(&self, req: &str, subpackage: Option<&str>) -> bool {
        self.requires
            .get(subpackage.unwrap_or(MAIN_SUBPACKAGE))
            .is_some_and(|set| set.contains(req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy_with_banned(banned: &[&str]) -> RequirementPolicy {
        RequirementPolicy {
            banned_buildreqs: banned.iter().map(|s| s.to_string()).collect(),
            ..RequirementPolicy::default()
        }
    }

    #[test]
    fn adding_same_buildreq_twice_changes_once() {
        let mut store = RequirementStore::default();
        assert!(store.add_buildreq("zlib-dev"));
        assert!(!store.add_buildreq("zlib-dev"));
        assert!(!store.add_buildreq("  zlib-dev "));
        assert_eq!(store.buildreqs().len(), 1);
    }

    #[test]
    fn banned_buildreq_is_never_added() {
        let mut store = RequirementStore::new(policy_with_banned(&["pkgconfig(gtk+-2.0)"]));
        for _ in 0..3 {
            assert!(!store.add_pkgconfig_buildreq("gtk+-2.0"));
        }
        assert!(store.buildreqs().is_empty());
        assert!(store.discovered().buildreqs.is_empty());
    }

    #[test]
    fn pkgconfig_adds_32bit_form_when_enabled() {
        let mut store = RequirementStore::new(RequirementPolicy {
            build_32bit: true,
            ..RequirementPolicy::default()
        });
        assert!(store.add_pkgconfig_buildreq("zlib"));
        assert!(store.has_buildreq("pkgconfig(zlib)"));
        assert!(store.has_buildreq("pkgconfig(32zlib)"));
        assert!(!store.add_pkgconfig_buildreq("zlib"));
    }

    #[test]
    fn requires_default_to_main_subpackage() {
        let mut store = RequirementStore::default();
        assert!(store.add_requires("R-methods", None));
        assert!(store.add_requires("R-methods", Some("doc")));
        assert!(!store.add_requires("R-methods", Some(MAIN_SUBPACKAGE)));
        assert!(store.has_requires("R-methods", None));
        assert!(store.has_requires("R-methods", Some("doc")));
    }

    #[test]
    fn requires_are_gated_by_known_packages() {
        let mut store = RequirementStore::new(RequirementPolicy {
            known_packages: ["R-methods".to_string()].into_iter().collect(),
            ..RequirementPolicy::default()
        });
        assert!(!store.add_requires("R-unknown", None));
        assert!(store.add_requires("R-methods", None));
    }

    #[test]
    fn discoveries_are_tracked_separately_from_manual_additions() {
        let mut store = RequirementStore::default();
        store.add_buildreq("make");
        store.add_discovered_buildreq("perl(File::Spec)");
        assert_eq!(store.buildreqs().len(), 2);
        assert_eq!(
            store.discovered().buildreqs.iter().collect::<Vec<_>>(),
            vec!["perl(File::Spec)"]
        );
    }

    #[test]
    fn seed_reports_only_new_entries() {
        let mut cached = DiscoveredRequirements::default();
        cached.buildreqs.insert("pkgconfig(zlib)".to_string());
        cached.buildreqs.insert("make".to_string());
        cached.requires.insert("R-methods".to_string());

        let mut store = RequirementStore::default();
        store.add_buildreq("make");
        assert_eq!(store.seed(&cached), 2);
        assert_eq!(store.seed(&cached), 0);
    }

    #[test]
    fn provides_are_deduplicated() {
        let mut store = RequirementStore::default();
        assert!(store.add_provides("bundled(foo)", None));
        assert!(!store.add_provides("bundled(foo)", None));
        assert_eq!(store.provides()[MAIN_SUBPACKAGE].len(), 1);
    }
}
