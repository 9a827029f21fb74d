//! Mock result logs: durable reads, per-round archiving and attempt records.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

use crate::core::types::{AttemptOutcome, PackageIdent, ShortCircuit};

/// Logs mock leaves in the results directory, archived after every round.
pub const ROUND_LOGS: [&str; 6] = [
    "build",
    "root",
    "srpm-build",
    "srpm-root",
    "mock_srpm",
    "mock_build",
];

/// Locations of the logs for one results directory.
#[derive(Debug, Clone)]
pub struct ResultPaths {
    pub dir: PathBuf,
    pub build_log: PathBuf,
    pub root_log: PathBuf,
}

impl ResultPaths {
    pub fn new(results_dir: &Path) -> Self {
        Self {
            dir: results_dir.to_path_buf(),
            build_log: results_dir.join("build.log"),
            root_log: results_dir.join("root.log"),
        }
    }

    pub fn log(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.log"))
    }

    pub fn round_log(&self, round: u32, name: &str) -> PathBuf {
        self.dir.join(format!("round{round}-{name}.log"))
    }

    pub fn round_outcome(&self, round: u32) -> PathBuf {
        self.dir.join(format!("round{round}-outcome.json"))
    }
}

/// Read a log after flushing it to storage, so a log still being written is never half-read.
///
/// Invalid UTF-8 is replaced rather than rejected; build output is not always clean text.
pub fn read_log_durable(path: &Path) -> Result<String> {
    let mut file = File::open(path).with_context(|| format!("open log {}", path.display()))?;
    file.sync_all()
        .with_context(|| format!("sync log {}", path.display()))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .with_context(|| format!("read log {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Read a log that may legitimately be absent (root.log when mock never started).
pub fn read_optional_log(path: &Path) -> Result<String> {
    if !path.exists() {
        return Ok(String::new());
    }
    read_log_durable(path)
}

/// Rename this round's logs to `round<N>-<log>.log`. Missing logs are skipped.
pub fn archive_round_logs(paths: &ResultPaths, round: u32) -> Result<Vec<PathBuf>> {
    let mut archived = Vec::new();
    for name in ROUND_LOGS {
        let src = paths.log(name);
        if !src.exists() {
            continue;
        }
        let dest = paths.round_log(round, name);
        fs::rename(&src, &dest)
            .with_context(|| format!("archive {} to {}", src.display(), dest.display()))?;
        archived.push(dest);
    }
    debug!(round, count = archived.len(), "archived round logs");
    Ok(archived)
}

/// Remove what earlier sessions left in the results directory: round logs,
/// archived `round<N>-*` files and built packages. Anything else is kept, so a
/// results directory shared with sources never loses them.
pub fn clear_previous_results(paths: &ResultPaths) -> Result<usize> {
    if !paths.dir.is_dir() {
        return Ok(0);
    }
    let entries =
        fs::read_dir(&paths.dir).with_context(|| format!("list {}", paths.dir.display()))?;
    let mut removed = 0;
    for entry in entries {
        let entry = entry.with_context(|| format!("list {}", paths.dir.display()))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !entry.file_type()?.is_file() || !is_result_artifact(name) {
            continue;
        }
        fs::remove_file(entry.path())
            .with_context(|| format!("remove {}", entry.path().display()))?;
        removed += 1;
    }
    debug!(removed, dir = %paths.dir.display(), "cleared previous results");
    Ok(removed)
}

fn is_result_artifact(name: &str) -> bool {
    if name.ends_with(".rpm") {
        return true;
    }
    if let Some(stem) = name.strip_suffix(".log")
        && ROUND_LOGS.contains(&stem)
    {
        return true;
    }
    name.strip_prefix("round")
        .and_then(|rest| rest.split_once('-'))
        .is_some_and(|(round, _)| !round.is_empty() && round.bytes().all(|b| b.is_ascii_digit()))
}

/// Record of one attempt, written next to the archived logs.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord<'a> {
    pub round: u32,
    pub package: &'a PackageIdent,
    pub short_circuit: Option<ShortCircuit>,
    pub duration_ms: u64,
    pub outcome: &'a AttemptOutcome,
}

pub fn write_attempt_record(paths: &ResultPaths, record: &AttemptRecord<'_>) -> Result<PathBuf> {
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create results dir {}", paths.dir.display()))?;
    let path = paths.round_outcome(record.round);
    let mut buf = serde_json::to_string_pretty(record)?;
    buf.push('\n');
    fs::write(&path, buf).with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::AttemptState;

    #[test]
    fn result_paths_are_stable() {
        let paths = ResultPaths::new(Path::new("/tmp/pkg/results"));
        assert!(paths.build_log.ends_with("results/build.log"));
        assert!(paths.root_log.ends_with("results/root.log"));
        assert!(paths.round_log(3, "srpm-root").ends_with("round3-srpm-root.log"));
        assert!(paths.round_outcome(3).ends_with("round3-outcome.json"));
    }

    #[test]
    fn reads_invalid_utf8_lossily() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("build.log");
        fs::write(&path, b"ok line\n\xff\xfe bad bytes\n").expect("write");
        let text = read_log_durable(&path).expect("read");
        assert!(text.starts_with("ok line\n"));
        assert!(text.contains("bad bytes"));
    }

    #[test]
    fn optional_log_missing_is_empty() {
        let temp = tempfile::tempdir().expect("tempdir");
        let text = read_optional_log(&temp.path().join("root.log")).expect("read");
        assert!(text.is_empty());
    }

    #[test]
    fn archives_present_logs_only() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = ResultPaths::new(temp.path());
        fs::write(&paths.build_log, "build").expect("write build");
        fs::write(paths.log("mock_build"), "mock").expect("write mock");

        let archived = archive_round_logs(&paths, 2).expect("archive");
        assert_eq!(archived.len(), 2);
        assert!(!paths.build_log.exists());
        assert_eq!(
            fs::read_to_string(paths.round_log(2, "build")).expect("read"),
            "build"
        );
        assert!(paths.round_log(2, "mock_build").exists());
    }

    #[test]
    fn clearing_keeps_files_that_are_not_build_artifacts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = ResultPaths::new(temp.path());
        for name in [
            "build.log",
            "mock_srpm.log",
            "round2-root.log",
            "round2-outcome.json",
            "foo-1.0-1.src.rpm",
            "foo.spec",
            "foo-1.0.tar.gz",
            "roundup.log",
            "config.log",
        ] {
            fs::write(temp.path().join(name), "x").expect("write");
        }
        fs::create_dir(temp.path().join("round3-dir")).expect("mkdir");

        let removed = clear_previous_results(&paths).expect("clear");
        assert_eq!(removed, 5);
        assert!(!paths.build_log.exists());
        assert!(!paths.round_outcome(2).exists());
        assert!(!temp.path().join("foo-1.0-1.src.rpm").exists());
        for kept in ["foo.spec", "foo-1.0.tar.gz", "roundup.log", "config.log", "round3-dir"] {
            assert!(temp.path().join(kept).exists(), "{kept} was removed");
        }
    }

    #[test]
    fn clearing_a_missing_dir_is_a_no_op() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = ResultPaths::new(&temp.path().join("results"));
        assert_eq!(clear_previous_results(&paths).expect("clear"), 0);
    }

    #[test]
    fn writes_attempt_record_json() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = ResultPaths::new(temp.path());
        let package = PackageIdent::new("x", "1.0", "2");
        let outcome = AttemptOutcome {
            exit_code: 1,
            new_requirements: vec!["pkgconfig(zlib)".to_string()],
            manifest_changed: false,
            state: AttemptState::RestartNeeded,
        };
        let path = write_attempt_record(
            &paths,
            &AttemptRecord {
                round: 1,
                package: &package,
                short_circuit: None,
                duration_ms: 5,
                outcome: &outcome,
            },
        )
        .expect("write");
        let raw = fs::read_to_string(path).expect("read");
        let value: serde_json::Value = serde_json::from_str(&raw).expect("json");
        assert_eq!(value["outcome"]["state"]["state"], "restart_needed");
        assert_eq!(value["package"]["name"], "x");
    }
}
