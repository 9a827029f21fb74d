//! Regenerates the requirement block of the package spec between rounds.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::debug;

use crate::core::requirements::{MAIN_SUBPACKAGE, RequirementStore};

const REQUIREMENTS_TEMPLATE: &str = include_str!("templates/requirements.spec.j2");

/// Receives the requirement store after every round that changed it.
pub trait SpecWriter {
    fn write_requirements(&mut self, store: &RequirementStore) -> Result<()>;
}

#[derive(Debug, Clone, Serialize)]
struct Section<'a> {
    subpackage: &'a str,
    items: Vec<&'a str>,
}

fn sections(map: &BTreeMap<String, BTreeSet<String>>) -> Vec<Section<'_>> {
    // Main subpackage first, the rest in name order.
    let mut out: Vec<Section<'_>> = map
        .iter()
        .filter(|(_, items)| !items.is_empty())
        .map(|(sub, items)| Section {
            subpackage: sub.as_str(),
            items: items.iter().map(String::as_str).collect(),
        })
        .collect();
    out.sort_by_key(|section| section.subpackage != MAIN_SUBPACKAGE);
    out
}

/// Render the requirement fragment for `package`.
pub fn render_requirements(package: &str, store: &RequirementStore) -> Result<String> {
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);
    env.add_template("requirements", REQUIREMENTS_TEMPLATE)
        .expect("requirements template should be valid");
    let template = env.get_template("requirements")?;
    let buildreqs: Vec<&str> = store.buildreqs().iter().map(String::as_str).collect();
    let mut rendered = template.render(context! {
        package => package,
        main => MAIN_SUBPACKAGE,
        buildreqs => buildreqs,
        requires => sections(store.requires()),
        provides => sections(store.provides()),
    })?;
    if !rendered.ends_with('\n') {
        rendered.push('\n');
    }
    Ok(rendered)
}

/// Writes the rendered fragment to a file next to the spec, for inclusion by the spec generator.
#[derive(Debug, Clone)]
pub struct FragmentWriter {
    package: String,
    path: PathBuf,
}

impl FragmentWriter {
    pub fn new(package: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            package: package.into(),
            path: path.into(),
        }
    }

    /// `<workdir>/<package>.requirements`
    pub fn in_workdir(workdir: &Path, package: &str) -> Self {
        Self::new(package, workdir.join(format!("{package}.requirements")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SpecWriter for FragmentWriter {
    fn write_requirements(&mut self, store: &RequirementStore) -> Result<()> {
        let rendered = render_requirements(&self.package, store)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        fs::write(&self.path, rendered)
            .with_context(|| format!("write requirements {}", self.path.display()))?;
        debug!(path = %self.path.display(), "wrote requirement fragment");
        Ok(())
    }
}
