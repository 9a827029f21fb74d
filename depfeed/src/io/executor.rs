//! Executor abstraction for build attempts.
//!
//! The [`BuildExecutor`] trait decouples the rebuild loop from the actual build
//! backend (currently `mock`). Tests use scripted executors that write
//! predetermined logs without spawning processes.

use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::core::types::{PackageIdent, ShortCircuit};
use crate::io::build_logs::{ResultPaths, clear_previous_results};
use crate::io::config::MockConfig;
use crate::io::process::run_command_with_timeout;

/// Parameters for one build attempt.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Package working directory (holds the spec file and sources).
    pub workdir: PathBuf,
    pub package: PackageIdent,
    /// Directory the backend must leave build.log and root.log in.
    pub results_dir: PathBuf,
    /// 1-based round number.
    pub round: u32,
    /// Maximum time to wait for each backend command.
    pub timeout: Duration,
    /// Truncate captured command output beyond this many bytes.
    pub output_limit_bytes: usize,
    pub short_circuit: Option<ShortCircuit>,
}

impl BuildRequest {
    pub fn paths(&self) -> ResultPaths {
        ResultPaths::new(&self.results_dir)
    }
}

/// What the backend reports after an attempt. Log contents are read separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildResult {
    pub exit_code: i32,
    pub build_log: PathBuf,
    pub root_log: PathBuf,
}

/// Abstraction over build backends.
pub trait BuildExecutor {
    /// Run one build attempt. A failing build is a normal result; `Err` is reserved
    /// for failures to drive the backend at all.
    fn build(&self, request: &BuildRequest) -> Result<BuildResult>;
}

/// Executor that drives `mock`: build the source package, then rebuild it.
#[derive(Debug, Clone)]
pub struct MockExecutor {
    config: MockConfig,
}

impl MockExecutor {
    pub fn new(config: MockConfig) -> Self {
        Self { config }
    }

    fn command(&self) -> Result<Command> {
        let (program, args) = self
            .config
            .command
            .split_first()
            .ok_or_else(|| anyhow!("mock.command is empty"))?;
        let mut cmd = Command::new(program);
        cmd.args(args);
        Ok(cmd)
    }

    fn cleanup_flag(&self) -> &'static str {
        if self.config.cleanup {
            "--cleanup-after"
        } else {
            "--no-cleanup-after"
        }
    }

    fn srpm_args(&self, request: &BuildRequest) -> Vec<String> {
        let mut args = vec![
            format!("--root={}", self.config.root),
            "--buildsrpm".to_string(),
            "--sources=./".to_string(),
            format!("--spec={}.spec", request.package.name),
            format!("--uniqueext={}", request.package.name),
            format!("--result={}", request.results_dir.display()),
            self.cleanup_flag().to_string(),
        ];
        args.extend(self.config.opts.iter().cloned());
        args
    }

    fn rebuild_args(&self, request: &BuildRequest) -> Vec<String> {
        let srpm = request
            .results_dir
            .join(format!("{}.src.rpm", request.package.nvr()));
        let mut args = vec![
            format!("--root={}", self.config.root),
            format!("--result={}", request.results_dir.display()),
            srpm.display().to_string(),
            format!("--uniqueext={}", request.package.name),
            self.cleanup_flag().to_string(),
        ];
        args.extend(self.config.opts.iter().cloned());
        if let Some(phase) = request.short_circuit {
            args.push(format!("--short-circuit={phase}"));
        }
        args
    }
}

impl BuildExecutor for MockExecutor {
    #[instrument(skip_all, fields(package = %request.package.name, round = request.round))]
    fn build(&self, request: &BuildRequest) -> Result<BuildResult> {
        let paths = request.paths();
        if request.round == 1 {
            clear_previous_results(&paths)?;
        }
        fs::create_dir_all(&paths.dir)
            .with_context(|| format!("create results dir {}", paths.dir.display()))?;

        info!(root = %self.config.root, "building source package");
        let mut srpm = self.command()?;
        srpm.args(self.srpm_args(request))
            .current_dir(&request.workdir);
        let output = run_command_with_timeout(
            srpm,
            request.timeout,
            request.output_limit_bytes,
            Some(&paths.log("mock_srpm")),
        )
        .context("run mock --buildsrpm")?;
        if output.timed_out || !output.status.success() {
            warn!(exit_code = output.exit_code(), "mock --buildsrpm failed");
            return Err(anyhow!(
                "mock --buildsrpm failed with exit code {} (see {})",
                output.exit_code(),
                paths.log("mock_srpm").display()
            ));
        }

        for name in ["root", "build"] {
            let src = paths.log(name);
            if src.exists() {
                let dest = paths.log(&format!("srpm-{name}"));
                fs::rename(&src, &dest)
                    .with_context(|| format!("back up {}", src.display()))?;
            }
        }

        info!(short_circuit = ?request.short_circuit, "rebuilding package");
        let mut rebuild = self.command()?;
        rebuild
            .args(self.rebuild_args(request))
            .current_dir(&request.workdir);
        let output = run_command_with_timeout(
            rebuild,
            request.timeout,
            request.output_limit_bytes,
            Some(&paths.log("mock_build")),
        )
        .context("run mock rebuild")?;

        let exit_code = output.exit_code();
        debug!(exit_code, timed_out = output.timed_out, "mock rebuild finished");
        Ok(BuildResult {
            exit_code,
            build_log: paths.build_log,
            root_log: paths.root_log,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(results_dir: PathBuf, short_circuit: Option<ShortCircuit>) -> BuildRequest {
        BuildRequest {
            workdir: PathBuf::from("/work/zlib"),
            package: PackageIdent::new("zlib", "1.3", "4"),
            results_dir,
            round: 1,
            timeout: Duration::from_secs(10),
            output_limit_bytes: 1000,
            short_circuit,
        }
    }

    #[test]
    fn rebuild_args_carry_short_circuit_and_srpm() {
        let exec = MockExecutor::new(MockConfig {
            opts: vec!["--enable-plugin=ccache".to_string()],
            ..MockConfig::default()
        });
        let args = exec.rebuild_args(&request(
            PathBuf::from("/work/zlib/results"),
            Some(ShortCircuit::Install),
        ));
        assert_eq!(args[0], "--root=clear");
        assert!(args.contains(&"/work/zlib/results/zlib-1.3-4.src.rpm".to_string()));
        assert!(args.contains(&"--no-cleanup-after".to_string()));
        assert!(args.contains(&"--enable-plugin=ccache".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("--short-circuit=install"));
    }

    #[test]
    fn srpm_args_use_spec_name_and_cleanup_flag() {
        let exec = MockExecutor::new(MockConfig {
            cleanup: true,
            ..MockConfig::default()
        });
        let args = exec.srpm_args(&request(PathBuf::from("results"), None));
        assert!(args.contains(&"--buildsrpm".to_string()));
        assert!(args.contains(&"--spec=zlib.spec".to_string()));
        assert!(args.contains(&"--uniqueext=zlib".to_string()));
        assert!(args.contains(&"--cleanup-after".to_string()));
    }

    #[test]
    fn fake_mock_produces_logs() {
        let temp = tempfile::tempdir().expect("tempdir");
        let results = temp.path().join("results");
        // Stand-in for mock: writes a log into the --result directory.
        let script = temp.path().join("fake-mock.sh");
        fs::write(
            &script,
            "#!/bin/sh\nfor a in \"$@\"; do case \"$a\" in --result=*) d=\"${a#--result=}\";; esac; done\n\
             echo 'Child return code was: 0' > \"$d/build.log\"\necho ok > \"$d/root.log\"\n",
        )
        .expect("write script");
        let exec = MockExecutor::new(MockConfig {
            command: vec!["sh".to_string(), script.display().to_string()],
            ..MockConfig::default()
        });
        let mut req = request(results.clone(), None);
        req.workdir = temp.path().to_path_buf();

        let result = exec.build(&req).expect("build");
        assert_eq!(result.exit_code, 0);
        assert!(result.build_log.exists());
        assert!(results.join("srpm-build.log").exists());
        assert!(results.join("mock_srpm.log").exists());
        assert!(results.join("mock_build.log").exists());
    }

    #[test]
    fn first_round_keeps_sources_in_a_shared_results_dir() {
        let temp = tempfile::tempdir().expect("tempdir");
        let workdir = temp.path();
        fs::write(workdir.join("zlib.spec"), "Name: zlib\n").expect("spec");
        fs::write(workdir.join("zlib-1.3.tar.gz"), "sources").expect("sources");
        fs::write(workdir.join("build.log"), "stale").expect("stale log");
        fs::write(workdir.join("round4-build.log"), "stale").expect("stale archive");
        let exec = MockExecutor::new(MockConfig {
            command: vec!["true".to_string()],
            ..MockConfig::default()
        });
        let mut req = request(workdir.to_path_buf(), None);
        req.workdir = workdir.to_path_buf();

        let result = exec.build(&req).expect("build");
        assert_eq!(result.exit_code, 0);
        assert!(workdir.join("zlib.spec").exists());
        assert!(workdir.join("zlib-1.3.tar.gz").exists());
        assert!(!workdir.join("build.log").exists());
        assert!(!workdir.join("round4-build.log").exists());
    }

    #[test]
    fn later_rounds_keep_archived_logs() {
        let temp = tempfile::tempdir().expect("tempdir");
        let results = temp.path().join("results");
        fs::create_dir_all(&results).expect("results");
        fs::write(results.join("round1-build.log"), "round 1").expect("archive");
        let exec = MockExecutor::new(MockConfig {
            command: vec!["true".to_string()],
            ..MockConfig::default()
        });
        let mut req = request(results.clone(), None);
        req.workdir = temp.path().to_path_buf();
        req.round = 2;

        exec.build(&req).expect("build");
        assert!(results.join("round1-build.log").exists());
    }

    #[test]
    fn srpm_failure_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let exec = MockExecutor::new(MockConfig {
            command: vec!["false".to_string()],
            ..MockConfig::default()
        });
        let mut req = request(temp.path().join("results"), None);
        req.workdir = temp.path().to_path_buf();
        let err = exec.build(&req).expect_err("srpm fails");
        assert!(err.to_string().contains("--buildsrpm"));
    }
}
