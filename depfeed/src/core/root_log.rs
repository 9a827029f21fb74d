//! Provisioning failures reported in the chroot's root.log.

use std::sync::LazyLock;

use regex::Regex;

static MISSING_PACKAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^.*No matching package to install: '(.*)'$").expect("valid missing-package regex")
});

/// Names the chroot package manager could not resolve.
///
/// A zero exit code means provisioning succeeded, so nothing is reported even
/// if the log mentions missing packages.
pub fn unresolvable_names(root_log: &str, exit_code: i32) -> Vec<String> {
    if exit_code == 0 {
        return Vec::new();
    }
    root_log
        .lines()
        .filter_map(|line| MISSING_PACKAGE.captures(line.trim_end_matches('\r')))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .collect()
}
