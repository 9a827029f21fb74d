//! Multi-round rebuild loop for `depfeed build`.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::attempt::run_attempt;
use crate::core::classifier::LogClassifier;
use crate::core::manifest::FileManifest;
use crate::core::requirements::RequirementStore;
use crate::core::types::{AttemptOutcome, AttemptState, FatalReason, ShortCircuit};
use crate::io::build_logs::{AttemptRecord, ResultPaths, archive_round_logs, write_attempt_record};
use crate::io::cache::{RequirementCache, write_cache};
use crate::io::executor::{BuildExecutor, BuildRequest};
use crate::io::spec_writer::SpecWriter;

/// Reason why `run_session` stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStop {
    /// The requested phase completed and the last attempt learned nothing new.
    Success,
    /// An attempt hit an unrecoverable condition.
    Fatal(FatalReason),
    /// The build failed and the logs offered nothing new to try.
    BuildFailed { exit_code: i32 },
    /// Every allowed round asked for another rebuild.
    MaxRoundsExceeded { max_rounds: u32 },
}

/// Summary of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    /// Attempts executed.
    pub rounds: u32,
    pub stop: SessionStop,
}

/// Fixed parameters for every attempt of a session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub workdir: PathBuf,
    pub results_dir: PathBuf,
    pub max_rounds: u32,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
    pub short_circuit: Option<ShortCircuit>,
    /// Save discovered requirements here when the session ends.
    pub cache_path: Option<PathBuf>,
}

/// Mutable state a session works on.
pub struct Session<'a, M: FileManifest + ?Sized, W: SpecWriter + ?Sized> {
    pub classifier: &'a mut LogClassifier,
    pub store: &'a mut RequirementStore,
    pub manifest: &'a mut M,
    pub writer: &'a mut W,
}

/// Build repeatedly until an attempt succeeds, fails without news, turns fatal,
/// or `max_rounds` attempts all asked for a restart.
///
/// The requirement block is written before the first attempt and after every
/// attempt that changed the store or the manifest. Errors driving the backend
/// or writing artifacts stop the session immediately.
pub fn run_session<E, M, W, F>(
    executor: &E,
    settings: &SessionSettings,
    session: Session<'_, M, W>,
    mut on_attempt: F,
) -> Result<SessionOutcome>
where
    E: BuildExecutor,
    M: FileManifest + ?Sized,
    W: SpecWriter + ?Sized,
    F: FnMut(u32, &AttemptOutcome),
{
    let Session {
        classifier,
        store,
        manifest,
        writer,
    } = session;
    let paths = ResultPaths::new(&settings.results_dir);

    writer
        .write_requirements(store)
        .context("write initial requirements")?;

    let mut round = 0u32;
    let stop = loop {
        if round >= settings.max_rounds {
            warn!(max_rounds = settings.max_rounds, "round limit reached");
            break SessionStop::MaxRoundsExceeded {
                max_rounds: settings.max_rounds,
            };
        }
        round += 1;

        let request = BuildRequest {
            workdir: settings.workdir.clone(),
            package: classifier.package().clone(),
            results_dir: settings.results_dir.clone(),
            round,
            timeout: settings.timeout,
            output_limit_bytes: settings.output_limit_bytes,
            short_circuit: settings.short_circuit,
        };
        let started = Instant::now();
        let outcome = run_attempt(executor, &request, classifier, store, manifest)
            .with_context(|| format!("round {round}"))?;

        write_attempt_record(
            &paths,
            &AttemptRecord {
                round,
                package: &request.package,
                short_circuit: settings.short_circuit,
                duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                outcome: &outcome,
            },
        )?;
        on_attempt(round, &outcome);

        match outcome.state {
            AttemptState::Success => break SessionStop::Success,
            AttemptState::Fatal { reason } => break SessionStop::Fatal(reason),
            AttemptState::Failed => {
                break SessionStop::BuildFailed {
                    exit_code: outcome.exit_code,
                };
            }
            AttemptState::RestartNeeded => {
                info!(
                    round,
                    added = ?outcome.new_requirements,
                    "rebuilding with updated requirements"
                );
                writer
                    .write_requirements(store)
                    .with_context(|| format!("write requirements after round {round}"))?;
                archive_round_logs(&paths, round)?;
            }
        }
    };

    if let Some(cache_path) = &settings.cache_path {
        let cache = RequirementCache::new(&classifier.package().name, store.discovered().clone());
        write_cache(cache_path, &cache)
            .with_context(|| format!("save requirement cache {}", cache_path.display()))?;
    }

    info!(rounds = round, stop = ?stop, "session finished");
    Ok(SessionOutcome { rounds: round, stop })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::manifest::FileList;
    use crate::core::patterns::PatternRegistry;
    use crate::core::requirements::RequirementPolicy;
    use crate::core::tables::NameTables;
    use crate::core::types::PackageIdent;
    use crate::io::spec_writer::FragmentWriter;
    use crate::test_support::{PackageDir, ScriptedBuild, ScriptedExecutor};

    struct Harness {
        dir: PackageDir,
        classifier: LogClassifier,
        store: RequirementStore,
        files: FileList,
        writer: FragmentWriter,
    }

    impl Harness {
        fn new() -> Self {
            let dir = PackageDir::new(PackageIdent::new("foo", "1.0", "1")).expect("dir");
            let classifier = LogClassifier::new(
                PatternRegistry::builtin().expect("registry"),
                NameTables::builtin().expect("tables"),
                dir.package.clone(),
                None,
            );
            let writer = FragmentWriter::in_workdir(dir.root(), "foo");
            Self {
                dir,
                classifier,
                store: RequirementStore::new(RequirementPolicy::default()),
                files: FileList::default(),
                writer,
            }
        }

        fn settings(&self, max_rounds: u32) -> SessionSettings {
            SessionSettings {
                workdir: self.dir.root().to_path_buf(),
                results_dir: self.dir.results_dir(),
                max_rounds,
                timeout: Duration::from_secs(5),
                output_limit_bytes: 1000,
                short_circuit: None,
                cache_path: None,
            }
        }

        fn run(&mut self, executor: &ScriptedExecutor, max_rounds: u32) -> SessionOutcome {
            let settings = self.settings(max_rounds);
            run_session(
                executor,
                &settings,
                Session {
                    classifier: &mut self.classifier,
                    store: &mut self.store,
                    manifest: &mut self.files,
                    writer: &mut self.writer,
                },
                |_, _| {},
            )
            .expect("session")
        }
    }

    #[test]
    fn converges_after_learning_a_requirement() {
        let mut harness = Harness::new();
        let executor = ScriptedExecutor::new(vec![
            ScriptedBuild::new(1, "checking for flex... no\n"),
            ScriptedBuild::new(0, "Executing(%clean\n"),
        ]);

        let outcome = harness.run(&executor, 20);
        assert_eq!(outcome.stop, SessionStop::Success);
        assert_eq!(outcome.rounds, 2);
        assert!(harness.store.has_buildreq("flex"));

        let paths = ResultPaths::new(&harness.dir.results_dir());
        assert!(paths.round_log(1, "build").exists());
        assert!(paths.round_outcome(1).exists());
        assert!(paths.round_outcome(2).exists());
        // The final round's logs stay in place.
        assert!(paths.build_log.exists());

        let fragment = std::fs::read_to_string(harness.writer.path()).expect("fragment");
        assert!(fragment.contains("BuildRequires : flex"));
    }

    #[test]
    fn stops_on_fatal_provisioning_failure() {
        let mut harness = Harness::new();
        let executor = ScriptedExecutor::new(vec![
            ScriptedBuild::new(30, "").with_root_log(
                "DEBUG util.py:446:  No matching package to install: 'pkgconfig(nope)'\n",
            ),
        ]);
        let outcome = harness.run(&executor, 20);
        assert_eq!(
            outcome.stop,
            SessionStop::Fatal(FatalReason::Unresolvable {
                names: vec!["pkgconfig(nope)".to_string()]
            })
        );
        assert_eq!(executor.calls(), 1);
    }

    #[test]
    fn failure_without_news_is_build_failed() {
        let mut harness = Harness::new();
        let executor = ScriptedExecutor::new(vec![ScriptedBuild::new(1, "error: boom\n")]);
        let outcome = harness.run(&executor, 20);
        assert_eq!(outcome.stop, SessionStop::BuildFailed { exit_code: 1 });
        assert_eq!(outcome.rounds, 1);
    }

    #[test]
    fn round_cap_stops_the_loop() {
        let mut harness = Harness::new();
        let executor = ScriptedExecutor::new(vec![
            ScriptedBuild::new(1, "checking for flex... no\n"),
            ScriptedBuild::new(1, "checking for bison... no\n"),
            ScriptedBuild::new(0, "Executing(%clean\n"),
        ]);
        let outcome = harness.run(&executor, 2);
        assert_eq!(outcome.stop, SessionStop::MaxRoundsExceeded { max_rounds: 2 });
        assert_eq!(outcome.rounds, 2);
        assert_eq!(executor.calls(), 2);
    }

    #[test]
    fn saves_discovered_requirements_to_cache() {
        let mut harness = Harness::new();
        let cache_path = harness.dir.root().join("cache.json");
        let executor = ScriptedExecutor::new(vec![
            ScriptedBuild::new(1, "checking for flex... no\n"),
            ScriptedBuild::new(0, "Executing(%clean\n"),
        ]);
        let mut settings = harness.settings(20);
        settings.cache_path = Some(cache_path.clone());
        let mut rounds_seen = Vec::new();
        run_session(
            &executor,
            &settings,
            Session {
                classifier: &mut harness.classifier,
                store: &mut harness.store,
                manifest: &mut harness.files,
                writer: &mut harness.writer,
            },
            |round, _| rounds_seen.push(round),
        )
        .expect("session");

        assert_eq!(rounds_seen, vec![1, 2]);
        let cache = crate::io::cache::load_cache(&cache_path, "foo")
            .expect("load")
            .expect("present");
        assert!(cache.discovered.buildreqs.contains("flex"));
    }
}
