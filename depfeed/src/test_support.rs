//! Test-only helpers: a scripted build executor and a scratch package directory.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::core::types::PackageIdent;
use crate::io::build_logs::ResultPaths;
use crate::io::executor::{BuildExecutor, BuildRequest, BuildResult};

/// One predetermined attempt.
#[derive(Debug, Clone)]
pub struct ScriptedBuild {
    pub exit_code: i32,
    /// `None` leaves no build.log behind.
    pub build_log: Option<String>,
    pub root_log: String,
}

impl ScriptedBuild {
    pub fn new(exit_code: i32, build_log: &str) -> Self {
        Self {
            exit_code,
            build_log: Some(build_log.to_string()),
            root_log: String::new(),
        }
    }

    pub fn with_root_log(mut self, root_log: &str) -> Self {
        self.root_log = root_log.to_string();
        self
    }

    pub fn without_build_log(exit_code: i32) -> Self {
        Self {
            exit_code,
            build_log: None,
            root_log: String::new(),
        }
    }
}

/// Executor that writes scripted logs into the results directory instead of running mock.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    builds: RefCell<VecDeque<ScriptedBuild>>,
    calls: Cell<u32>,
}

impl ScriptedExecutor {
    pub fn new(builds: Vec<ScriptedBuild>) -> Self {
        Self {
            builds: RefCell::new(builds.into()),
            calls: Cell::new(0),
        }
    }

    /// Number of attempts executed so far.
    pub fn calls(&self) -> u32 {
        self.calls.get()
    }
}

impl BuildExecutor for ScriptedExecutor {
    fn build(&self, request: &BuildRequest) -> Result<BuildResult> {
        let build = self
            .builds
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted build left for round {}", request.round))?;
        self.calls.set(self.calls.get() + 1);

        let paths = ResultPaths::new(&request.results_dir);
        fs::create_dir_all(&paths.dir)
            .with_context(|| format!("create {}", paths.dir.display()))?;
        if let Some(log) = &build.build_log {
            fs::write(&paths.build_log, log)
                .with_context(|| format!("write {}", paths.build_log.display()))?;
        }
        fs::write(&paths.root_log, &build.root_log)
            .with_context(|| format!("write {}", paths.root_log.display()))?;

        Ok(BuildResult {
            exit_code: build.exit_code,
            build_log: paths.build_log,
            root_log: paths.root_log,
        })
    }
}

/// Temporary package working directory with a stub spec file.
pub struct PackageDir {
    dir: TempDir,
    pub package: PackageIdent,
}

impl PackageDir {
    pub fn new(package: PackageIdent) -> Result<Self> {
        let dir = tempfile::tempdir().context("create package dir")?;
        let spec = dir.path().join(format!("{}.spec", package.name));
        fs::write(
            &spec,
            format!(
                "Name: {}\nVersion: {}\nRelease: {}\n",
                package.name, package.version, package.release
            ),
        )
        .with_context(|| format!("write {}", spec.display()))?;
        Ok(Self { dir, package })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn results_dir(&self) -> PathBuf {
        self.dir.path().join("results")
    }
}
