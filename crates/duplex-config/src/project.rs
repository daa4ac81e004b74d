//! Project file discovery.
//!
//! A project may carry a `duplex.toml` at its root. Every section is optional;
//! the defaults describe the conventional layout (`src/website` and
//! `src/server` compiled into `build/website` and `build/server`).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};

/// Conventional project file name.
pub const PROJECT_FILE: &str = "duplex.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    #[serde(default = "PipelineSection::frontend")]
    pub frontend: PipelineSection,

    #[serde(default = "PipelineSection::backend")]
    pub backend: PipelineSection,

    #[serde(default)]
    pub compiler: CompilerSection,

    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub overrides: OverrideSection,

    /// Persisted compiler-state record for the backend pipeline.
    #[serde(default = "default_records_path")]
    pub records_path: PathBuf,

    /// Installed third-party packages, externalized from the backend bundle.
    #[serde(default = "default_modules_dir")]
    pub modules_dir: PathBuf,

    /// Scratch directory for materialized compiler configurations.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Read by the run settings loader, accepted here so one file can hold both.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<Value>,
}

/// Per-pipeline inputs and outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineSection {
    pub entry: Vec<PathBuf>,
    pub output_dir: PathBuf,
    /// Output file name pattern, `[name]` is replaced by the entry name.
    pub filename: String,
    /// Directories watched for source changes.
    #[serde(default)]
    pub sources: Vec<PathBuf>,
}

/// The opaque external compiler.
///
/// `{config}` in `args` is replaced by the path of the materialized
/// configuration, `{pipeline}` by the pipeline name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompilerSection {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// How the backend bundle is run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    /// Interpreter and leading arguments for the backend bundle.
    #[serde(default = "default_server_command")]
    pub command: Vec<String>,

    /// Bundle file inside the backend output directory.
    #[serde(default = "default_server_script")]
    pub script: String,

    /// Always-restart-on-crash wrapper used by the production run.
    #[serde(default = "default_wrapper")]
    pub wrapper: Vec<String>,

    /// Restart the backend after a failed rebuild too.
    #[serde(default = "default_true")]
    pub restart_on_failed_build: bool,
}

/// Free-form tables composed over the generated configurations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OverrideSection {
    #[serde(default)]
    pub base: Value,
    #[serde(default)]
    pub frontend: Value,
    #[serde(default)]
    pub backend: Value,
}

impl PipelineSection {
    pub fn frontend() -> Self {
        Self {
            entry: vec![PathBuf::from("src/website/index.js")],
            output_dir: PathBuf::from("build/website"),
            filename: "[name].js".to_string(),
            sources: vec![PathBuf::from("src/website")],
        }
    }

    pub fn backend() -> Self {
        Self {
            entry: vec![PathBuf::from("src/server/main.js")],
            output_dir: PathBuf::from("build/server"),
            filename: default_server_script(),
            sources: vec![PathBuf::from("src/server")],
        }
    }
}

impl Default for CompilerSection {
    fn default() -> Self {
        Self {
            program: "npx".to_string(),
            args: vec![
                "webpack".to_string(),
                "--config".to_string(),
                "{config}".to_string(),
            ],
        }
    }
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            command: default_server_command(),
            script: default_server_script(),
            wrapper: default_wrapper(),
            restart_on_failed_build: true,
        }
    }
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            frontend: PipelineSection::frontend(),
            backend: PipelineSection::backend(),
            compiler: CompilerSection::default(),
            server: ServerSection::default(),
            overrides: OverrideSection::default(),
            records_path: default_records_path(),
            modules_dir: default_modules_dir(),
            state_dir: default_state_dir(),
            ports: None,
        }
    }
}

impl ProjectConfig {
    /// Locate `duplex.toml` under `root`.
    pub fn find(root: &Path) -> Option<PathBuf> {
        let path = root.join(PROJECT_FILE);
        path.is_file().then_some(path)
    }

    /// Load the project file under `root`, or the defaults when there is none.
    pub fn discover(root: &Path) -> Result<(Self, Option<PathBuf>)> {
        match Self::find(root) {
            Some(path) => {
                let config = Self::load_from(&path)?;
                tracing::debug!(path = %path.display(), "loaded project file");
                Ok((config, Some(path)))
            }
            None => {
                tracing::debug!(root = %root.display(), "no project file, using defaults");
                Ok((Self::default(), None))
            }
        }
    }

    /// Load a project file from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let toml_val: toml::Value =
            toml::from_str(content).map_err(|e| ConfigError::InvalidValue {
                field: "toml".to_string(),
                hint: Some(format!("Invalid TOML syntax: {}", e)),
            })?;

        let value = serde_json::to_value(toml_val).map_err(|e| ConfigError::InvalidValue {
            field: "toml".to_string(),
            hint: Some(format!("TOML to JSON conversion failed: {}", e)),
        })?;

        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| ConfigError::InvalidValue {
            field: "project".to_string(),
            hint: Some(e.to_string()),
        })
    }
}

fn default_server_command() -> Vec<String> {
    vec!["node".to_string()]
}

fn default_server_script() -> String {
    "backend.js".to_string()
}

fn default_wrapper() -> Vec<String> {
    vec!["./node_modules/.bin/forever".to_string()]
}

fn default_records_path() -> PathBuf {
    PathBuf::from("build/_records")
}

fn default_modules_dir() -> PathBuf {
    PathBuf::from("node_modules")
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".duplex")
}

fn default_true() -> bool {
    true
}
