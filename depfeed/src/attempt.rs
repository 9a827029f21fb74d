//! One build attempt: run the executor, read its logs and classify them.

use std::path::Path;

use anyhow::Result;
use tracing::{error, info, instrument};

use crate::core::classifier::LogClassifier;
use crate::core::manifest::FileManifest;
use crate::core::requirements::RequirementStore;
use crate::core::types::{AttemptOutcome, AttemptState, FatalReason};
use crate::io::build_logs::{read_log_durable, read_optional_log};
use crate::io::executor::{BuildExecutor, BuildRequest};

/// Run the executor once and classify what it left behind.
#[instrument(skip_all, fields(round = request.round, package = %request.package.name))]
pub fn run_attempt<E: BuildExecutor, M: FileManifest + ?Sized>(
    executor: &E,
    request: &BuildRequest,
    classifier: &mut LogClassifier,
    store: &mut RequirementStore,
    manifest: &mut M,
) -> Result<AttemptOutcome> {
    info!("building package");
    let result = executor.build(request)?;
    classify_logs(
        result.exit_code,
        &result.root_log,
        &result.build_log,
        classifier,
        store,
        manifest,
    )
}

/// Classify an attempt from log files on disk.
///
/// A missing build log is fatal: it means the backend never reached the build.
/// A missing root log is read as empty.
pub fn classify_logs<M: FileManifest + ?Sized>(
    exit_code: i32,
    root_log: &Path,
    build_log: &Path,
    classifier: &mut LogClassifier,
    store: &mut RequirementStore,
    manifest: &mut M,
) -> Result<AttemptOutcome> {
    if !build_log.exists() {
        let reason = FatalReason::MissingBuildLog {
            path: build_log.display().to_string(),
        };
        error!(%reason, "build attempt is fatal");
        return Ok(AttemptOutcome {
            exit_code,
            new_requirements: Vec::new(),
            manifest_changed: false,
            state: AttemptState::Fatal { reason },
        });
    }
    let root_text = read_optional_log(root_log)?;
    let build_text = read_log_durable(build_log)?;
    Ok(classifier.classify(exit_code, &root_text, &build_text, store, manifest))
}
