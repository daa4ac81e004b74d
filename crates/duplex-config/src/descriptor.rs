//! Pipeline descriptors.
//!
//! A [`PipelineDescriptor`] carries everything needed to compile one of the
//! two pipelines: entry points, output location, watched sources and the
//! configuration layers it is materialized from. Descriptors are built once
//! per run by [`DescriptorBuilder`] and never change afterwards; a malformed
//! descriptor is a [`ConfigError`] and no pipeline is built from it.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::compose::compose_all;
use crate::error::{ConfigError, Result};
use crate::externals::scan_externals;
use crate::mode::{plugin_list, Mode};
use crate::project::{PipelineSection, ProjectConfig};
use crate::settings::RunConfig;

/// The two pipelines of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineKind {
    Frontend,
    Backend,
}

impl PipelineKind {
    pub const ALL: [PipelineKind; 2] = [PipelineKind::Frontend, PipelineKind::Backend];

    pub fn as_str(self) -> &'static str {
        match self {
            PipelineKind::Frontend => "frontend",
            PipelineKind::Backend => "backend",
        }
    }
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct PipelineDescriptor {
    kind: PipelineKind,
    mode: Mode,
    entries: Vec<PathBuf>,
    output_dir: PathBuf,
    filename: String,
    sources: Vec<PathBuf>,
    base: Arc<Value>,
    layers: Vec<Value>,
}

impl PipelineDescriptor {
    pub fn kind(&self) -> PipelineKind {
        self.kind
    }

    pub fn name(&self) -> &'static str {
        self.kind.as_str()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Output file name pattern after mode-dependent naming was applied.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    /// Glob describing the artifacts purged before every build or watch.
    pub fn artifact_glob(&self) -> String {
        format!("{}/**/*", self.output_dir.display())
    }

    /// Compose the shared base with this pipeline's layers.
    ///
    /// The result is a fresh value on every call; the base is shared between
    /// both pipelines and is never written to.
    pub fn materialize(&self) -> Value {
        compose_all(&self.base, self.layers.iter())
    }
}

/// Both descriptors of a run.
#[derive(Debug, Clone)]
pub struct Pipelines {
    pub frontend: PipelineDescriptor,
    pub backend: PipelineDescriptor,
}

impl Pipelines {
    pub fn get(&self, kind: PipelineKind) -> &PipelineDescriptor {
        match kind {
            PipelineKind::Frontend => &self.frontend,
            PipelineKind::Backend => &self.backend,
        }
    }
}

/// Builds the descriptors of a run from the run snapshot and the project file.
pub struct DescriptorBuilder<'a> {
    root: PathBuf,
    run: &'a RunConfig,
    project: &'a ProjectConfig,
}

impl<'a> DescriptorBuilder<'a> {
    pub fn new(root: impl Into<PathBuf>, run: &'a RunConfig, project: &'a ProjectConfig) -> Self {
        Self {
            root: root.into(),
            run,
            project,
        }
    }

    /// Build and cross-check both descriptors.
    pub fn pipelines(&self) -> Result<Pipelines> {
        let base = Arc::new(self.shared_base()?);
        let frontend = self.frontend(Arc::clone(&base))?;
        let backend = self.backend(base)?;

        if overlaps(&frontend.output_dir, &backend.output_dir) {
            return Err(ConfigError::malformed(
                "backend",
                format!(
                    "output directory {} overlaps the frontend output {}",
                    backend.output_dir.display(),
                    frontend.output_dir.display()
                ),
            ));
        }

        Ok(Pipelines { frontend, backend })
    }

    /// Baseline shared by both pipelines, with the user's base override applied.
    fn shared_base(&self) -> Result<Value> {
        let mode = self.run.mode();
        let production = mode.is_production();
        let generated = json!({
            "mode": mode.node_env(),
            "context": self.root.display().to_string(),
            "devtool": if production { "source-map" } else { "eval-cheap-module-source-map" },
            "debug": !production,
            "cache": !production,
            "bail": production,
            "resolve": { "extensions": [".js", ".json"] },
            "plugins": [],
        });

        let user = table_or_empty("base", &self.project.overrides.base)?;
        Ok(compose_all(&generated, [&user]))
    }

    fn frontend(&self, base: Arc<Value>) -> Result<PipelineDescriptor> {
        let kind = PipelineKind::Frontend;
        let section = &self.project.frontend;
        let mode = self.run.mode();
        self.validate_section(kind, section)?;

        let filename = if mode.is_production() {
            hashed_filename(&section.filename)
        } else {
            section.filename.clone()
        };
        let output_dir = self.resolve(&section.output_dir);
        let entries = self.resolve_all(&section.entry);

        let mut generated = json!({
            "name": kind.as_str(),
            "target": "web",
            "entry": { "main": paths_to_value(&entries) },
            "output": {
                "path": output_dir.display().to_string(),
                "filename": filename,
                "chunkFilename": chunk_filename(&filename),
                "publicPath": "/",
            },
            "plugins": plugin_list(kind, mode),
        });

        if mode == Mode::Watch {
            generated["devServer"] = json!({
                "host": "127.0.0.1",
                "port": self.run.ports.dev_server,
                "hot": true,
                "proxy": format!("http://127.0.0.1:{}", self.run.ports.http_server),
            });
        }

        let user = table_or_empty(kind.as_str(), &self.project.overrides.frontend)?;
        Ok(PipelineDescriptor {
            kind,
            mode,
            sources: self.resolve_all(&section.sources),
            entries,
            output_dir,
            filename,
            base,
            layers: vec![generated, user],
        })
    }

    fn backend(&self, base: Arc<Value>) -> Result<PipelineDescriptor> {
        let kind = PipelineKind::Backend;
        let section = &self.project.backend;
        let mode = self.run.mode();
        self.validate_section(kind, section)?;

        if section.filename != self.project.server.script {
            return Err(ConfigError::malformed(
                kind,
                format!(
                    "bundle name '{}' does not match the server script '{}'",
                    section.filename, self.project.server.script
                ),
            ));
        }

        let output_dir = self.resolve(&section.output_dir);
        let entries = self.resolve_all(&section.entry);
        let externals = scan_externals(&self.resolve(&self.project.modules_dir))?;

        let generated = json!({
            "name": kind.as_str(),
            "target": "node",
            "entry": { "main": paths_to_value(&entries) },
            "output": {
                "path": output_dir.display().to_string(),
                "filename": section.filename,
                "libraryTarget": "commonjs2",
            },
            "node": { "__dirname": false, "__filename": false },
            "externals": externals,
            "recordsPath": self.resolve(&self.project.records_path).display().to_string(),
            "plugins": plugin_list(kind, mode),
        });

        let user = table_or_empty(kind.as_str(), &self.project.overrides.backend)?;
        Ok(PipelineDescriptor {
            kind,
            mode,
            sources: self.resolve_all(&section.sources),
            entries,
            output_dir,
            filename: section.filename.clone(),
            base,
            layers: vec![generated, user],
        })
    }

    fn validate_section(&self, kind: PipelineKind, section: &PipelineSection) -> Result<()> {
        if section.entry.is_empty() {
            return Err(ConfigError::malformed(kind, "no entry points"));
        }
        if section.filename.trim().is_empty() {
            return Err(ConfigError::malformed(kind, "empty output filename"));
        }
        if section.output_dir.as_os_str().is_empty() {
            return Err(ConfigError::malformed(kind, "empty output directory"));
        }

        // Outputs are purged recursively before every build.
        let output_dir = self.resolve(&section.output_dir);
        if output_dir.parent().is_none() || normalize(&self.root).starts_with(&output_dir) {
            return Err(ConfigError::malformed(
                kind,
                format!(
                    "output directory {} would purge the project root",
                    output_dir.display()
                ),
            ));
        }
        Ok(())
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            normalize(path)
        } else {
            normalize(&self.root.join(path))
        }
    }

    fn resolve_all(&self, paths: &[PathBuf]) -> Vec<PathBuf> {
        paths.iter().map(|p| self.resolve(p)).collect()
    }
}

/// `[name].js` becomes `[name].[contenthash].js` for cache-busting.
fn hashed_filename(pattern: &str) -> String {
    if pattern.contains("[contenthash]") || pattern.contains("[chunkhash]") {
        return pattern.to_string();
    }
    match pattern.rfind('.') {
        Some(dot) if dot > 0 => format!("{}.[contenthash]{}", &pattern[..dot], &pattern[dot..]),
        _ => format!("{}.[contenthash]", pattern),
    }
}

fn chunk_filename(filename: &str) -> String {
    filename.replace("[name]", "[id]")
}

fn paths_to_value(paths: &[PathBuf]) -> Value {
    Value::Array(
        paths
            .iter()
            .map(|p| Value::String(p.display().to_string()))
            .collect(),
    )
}

/// User overrides must be tables; an absent table composes as a no-op.
fn table_or_empty(section: &str, value: &Value) -> Result<Value> {
    match value {
        Value::Null => Ok(json!({})),
        Value::Object(_) => Ok(value.clone()),
        other => Err(ConfigError::InvalidValue {
            field: format!("overrides.{}", section),
            hint: Some(format!("expected a table, found {}", type_name(other))),
        }),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "a table",
    }
}

/// Lexically clean a path (`a/./b/../c` becomes `a/c`).
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn overlaps(a: &Path, b: &Path) -> bool {
    let (a, b) = (normalize(a), normalize(b));
    a.starts_with(&b) || b.starts_with(&a)
}
