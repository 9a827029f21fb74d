//! Contract with the package file-list collaborator.
//!
//! The classifier only routes lines: files listed as installed-but-unpackaged
//! are pushed, files rpmbuild could not find are removed. Deciding which
//! subpackage a file belongs to is the collaborator's business.

use std::collections::BTreeSet;

use tracing::{info, warn};

/// Receiver for file-list notifications from the build log.
pub trait FileManifest {
    /// Called once per scan when the unpackaged-files section starts.
    fn begin_unpackaged(&mut self, _package: &str) {}

    /// A file was installed but is not packaged yet. Returns `true` if the manifest changed.
    fn push_file(&mut self, path: &str, package: &str) -> bool;

    /// A packaged file no longer exists in the buildroot. Returns `true` if the manifest changed.
    fn remove_file(&mut self, path: &str) -> bool;

    /// Paths seen under banned locations so far. Non-empty ends the session.
    fn banned_paths(&self) -> Vec<String>;
}

/// Flat in-memory file list with banned-prefix policy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileList {
    files: BTreeSet<String>,
    removed: BTreeSet<String>,
    banned_prefixes: Vec<String>,
    banned_hits: Vec<String>,
}

impl FileList {
    pub fn new(banned_prefixes: Vec<String>) -> Self {
        Self {
            banned_prefixes,
            ..Self::default()
        }
    }

    pub fn files(&self) -> &BTreeSet<String> {
        &self.files
    }

    fn is_banned(&self, path: &str) -> bool {
        self.banned_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }
}

impl FileManifest for FileList {
    fn push_file(&mut self, path: &str, _package: &str) -> bool {
        if self.files.contains(path) || self.removed.contains(path) {
            return false;
        }
        if self.is_banned(path) {
            warn!(path, "content found in banned path, skipping");
            self.banned_hits.push(path.to_string());
            return false;
        }
        self.files.insert(path.to_string());
        info!(path, "new %files content found");
        true
    }

    fn remove_file(&mut self, path: &str) -> bool {
        if !self.files.remove(path) {
            return false;
        }
        info!(path, "file no longer present");
        self.removed.insert(path.to_string());
        true
    }

    fn banned_paths(&self) -> Vec<String> {
        self.banned_hits.clone()
    }
}
