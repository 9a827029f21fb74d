//! Log-driven build dependency discovery for mock-based RPM builds.
//!
//! `depfeed build` drives mock until the package converges; `depfeed scan`
//! classifies an existing attempt; `depfeed render` prints the requirement
//! block saved in a cache.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;

use depfeed::attempt::classify_logs;
use depfeed::core::classifier::LogClassifier;
use depfeed::core::manifest::FileList;
use depfeed::core::requirements::RequirementStore;
use depfeed::core::types::{AttemptOutcome, AttemptState, PackageIdent, ShortCircuit};
use depfeed::exit_codes;
use depfeed::io::cache::load_cache;
use depfeed::io::config::{CONFIG_FILE, DepfeedConfig, load_config};
use depfeed::io::executor::MockExecutor;
use depfeed::io::spec_writer::{FragmentWriter, SpecWriter, render_requirements};
use depfeed::logging;
use depfeed::looping::{Session, SessionSettings, SessionStop, run_session};

#[derive(Parser)]
#[command(
    name = "depfeed",
    version,
    about = "Discover build dependencies of an RPM package from its build logs"
)]
struct Cli {
    /// Config file (default: `<workdir>/depfeed.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug, Clone)]
struct PackageArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    version: String,
    #[arg(long)]
    release: String,
    /// Stop after this rpmbuild phase (prep, build, install, binary).
    #[arg(long)]
    short_circuit: Option<ShortCircuit>,
}

impl PackageArgs {
    fn ident(&self) -> PackageIdent {
        PackageIdent::new(&self.name, &self.version, &self.release)
    }
}

#[derive(Subcommand)]
enum Command {
    /// Classify one finished attempt from its logs and print the result as JSON.
    Scan {
        #[command(flatten)]
        package: PackageArgs,
        #[arg(long)]
        build_log: PathBuf,
        #[arg(long)]
        root_log: Option<PathBuf>,
        /// Exit code of the build command.
        #[arg(long, allow_negative_numbers = true)]
        exit_code: i32,
        /// Package working directory, for resolving config-relative paths.
        #[arg(long, default_value = ".")]
        workdir: PathBuf,
    },
    /// Build with mock until the requirement set converges.
    Build {
        #[command(flatten)]
        package: PackageArgs,
        /// Package working directory holding `<name>.spec` and sources.
        #[arg(long, default_value = ".")]
        workdir: PathBuf,
    },
    /// Print the requirement block recorded in a requirement cache.
    Render {
        #[arg(long)]
        cache: PathBuf,
        /// Package the cache was recorded for.
        #[arg(long)]
        name: String,
        /// Write to this file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Scan {
            package,
            build_log,
            root_log,
            exit_code,
            workdir,
        } => cmd_scan(
            cli.config.as_deref(),
            &workdir,
            &package,
            &build_log,
            root_log.as_deref(),
            exit_code,
        ),
        Command::Build { package, workdir } => {
            cmd_build(cli.config.as_deref(), &workdir, &package)
        }
        Command::Render {
            cache,
            name,
            output,
        } => cmd_render(&cache, &name, output.as_deref()),
    }
}

fn load_workdir_config(config: Option<&Path>, workdir: &Path) -> Result<DepfeedConfig> {
    let path = config.map_or_else(|| workdir.join(CONFIG_FILE), Path::to_path_buf);
    load_config(&path).with_context(|| format!("load config {}", path.display()))
}

/// Everything a session or a one-off scan needs, built from config.
struct Toolkit {
    classifier: LogClassifier,
    store: RequirementStore,
    files: FileList,
}

fn toolkit(cfg: &DepfeedConfig, workdir: &Path, package: &PackageArgs) -> Result<Toolkit> {
    let classifier = LogClassifier::new(
        cfg.load_registry(workdir)?,
        cfg.load_tables(workdir)?,
        package.ident(),
        package.short_circuit,
    );
    let mut store = RequirementStore::new(cfg.requirement_policy());
    if let Some(cache_path) = cfg.cache_path(workdir)
        && let Some(cache) = load_cache(&cache_path, &package.name)?
    {
        store.seed(&cache.discovered);
    }
    Ok(Toolkit {
        classifier,
        store,
        files: FileList::new(cfg.banned_paths.clone()),
    })
}

#[derive(Serialize)]
struct ScanReport<'a> {
    outcome: &'a AttemptOutcome,
    buildreqs: Vec<&'a str>,
    requires: Vec<&'a str>,
    files: Vec<&'a str>,
}

fn cmd_scan(
    config: Option<&Path>,
    workdir: &Path,
    package: &PackageArgs,
    build_log: &Path,
    root_log: Option<&Path>,
    exit_code: i32,
) -> Result<i32> {
    let cfg = load_workdir_config(config, workdir)?;
    let mut kit = toolkit(&cfg, workdir, package)?;
    let root_log = root_log.map_or_else(
        || build_log.with_file_name("root.log"),
        Path::to_path_buf,
    );
    let outcome = classify_logs(
        exit_code,
        &root_log,
        build_log,
        &mut kit.classifier,
        &mut kit.store,
        &mut kit.files,
    )?;

    let report = ScanReport {
        outcome: &outcome,
        buildreqs: kit.store.discovered().buildreqs.iter().map(String::as_str).collect(),
        requires: kit.store.discovered().requires.iter().map(String::as_str).collect(),
        files: kit.files.files().iter().map(String::as_str).collect(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(match outcome.state {
        AttemptState::Success | AttemptState::RestartNeeded => exit_codes::OK,
        AttemptState::Fatal { .. } => exit_codes::FATAL,
        AttemptState::Failed => exit_codes::FAILED,
    })
}

fn cmd_build(config: Option<&Path>, workdir: &Path, package: &PackageArgs) -> Result<i32> {
    let workdir = workdir
        .canonicalize()
        .with_context(|| format!("resolve workdir {}", workdir.display()))?;
    let spec = workdir.join(format!("{}.spec", package.name));
    if !spec.exists() {
        bail!("missing spec file {}", spec.display());
    }
    let cfg = load_workdir_config(config, &workdir)?;
    let mut kit = toolkit(&cfg, &workdir, package)?;
    let mut writer = FragmentWriter::in_workdir(&workdir, &package.name);
    let executor = MockExecutor::new(cfg.mock.clone());
    let settings = SessionSettings {
        workdir: workdir.clone(),
        results_dir: cfg.results_dir(&workdir)?,
        max_rounds: cfg.max_rounds,
        timeout: Duration::from_secs(cfg.build_timeout_secs),
        output_limit_bytes: cfg.output_limit_bytes,
        short_circuit: package.short_circuit,
        cache_path: cfg.cache_path(&workdir),
    };

    let outcome = run_session(
        &executor,
        &settings,
        Session {
            classifier: &mut kit.classifier,
            store: &mut kit.store,
            manifest: &mut kit.files,
            writer: &mut writer,
        },
        |round, attempt| {
            eprintln!(
                "round {round}: {} ({} new requirements)",
                state_label(&attempt.state),
                attempt.new_requirements.len()
            );
        },
    )?;

    let code = match &outcome.stop {
        SessionStop::Success => {
            println!("{} built successfully after {} rounds", package.name, outcome.rounds);
            exit_codes::OK
        }
        SessionStop::Fatal(reason) => {
            eprintln!("fatal: {reason}");
            exit_codes::FATAL
        }
        SessionStop::BuildFailed { exit_code } => {
            eprintln!("build failed with exit code {exit_code} and nothing new to try");
            exit_codes::FAILED
        }
        SessionStop::MaxRoundsExceeded { max_rounds } => {
            eprintln!("no convergence after {max_rounds} rounds");
            exit_codes::CAP
        }
    };
    Ok(code)
}

fn cmd_render(cache: &Path, name: &str, output: Option<&Path>) -> Result<i32> {
    let Some(cache) = load_cache(cache, name)? else {
        bail!("no requirement cache for {name} at {}", cache.display());
    };
    let mut store = RequirementStore::default();
    store.seed(&cache.discovered);
    match output {
        Some(path) => FragmentWriter::new(name, path).write_requirements(&store)?,
        None => print!("{}", render_requirements(name, &store)?),
    }
    Ok(exit_codes::OK)
}

fn state_label(state: &AttemptState) -> &'static str {
    match state {
        AttemptState::Success => "success",
        AttemptState::RestartNeeded => "restart needed",
        AttemptState::Fatal { .. } => "fatal",
        AttemptState::Failed => "failed",
    }
}
