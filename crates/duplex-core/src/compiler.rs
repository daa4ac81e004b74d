//! The external compiler seam.
//!
//! The engine never bundles anything itself. A [`Compiler`] receives a
//! materialized configuration and reports either [`CompileStats`] or a
//! [`CompileError`]; [`CommandCompiler`] does so by running a configured
//! program against a JSON file holding that configuration.

use async_trait::async_trait;
use duplex_config::{CompilerSection, PipelineDescriptor, PipelineKind};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;

/// Placeholder replaced by the materialized configuration path.
pub const CONFIG_PLACEHOLDER: &str = "{config}";
/// Placeholder replaced by the pipeline name.
pub const PIPELINE_PLACEHOLDER: &str = "{pipeline}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileStats {
    /// Human-readable report produced by the compiler.
    pub report: String,
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{pipeline} compilation failed: {message}")]
pub struct CompileError {
    pub pipeline: PipelineKind,
    pub message: String,
    pub exit_code: Option<i32>,
}

impl CompileError {
    pub fn new(pipeline: PipelineKind, message: impl Into<String>) -> Self {
        Self {
            pipeline,
            message: message.into(),
            exit_code: None,
        }
    }

    pub fn with_exit_code(mut self, code: Option<i32>) -> Self {
        self.exit_code = code;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Success(CompileStats),
    Failure(CompileError),
}

impl BuildOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BuildOutcome::Success(_))
    }

    pub fn error(&self) -> Option<&CompileError> {
        match self {
            BuildOutcome::Failure(err) => Some(err),
            BuildOutcome::Success(_) => None,
        }
    }
}

impl From<Result<CompileStats, CompileError>> for BuildOutcome {
    fn from(result: Result<CompileStats, CompileError>) -> Self {
        match result {
            Ok(stats) => BuildOutcome::Success(stats),
            Err(err) => BuildOutcome::Failure(err),
        }
    }
}

/// One compiler invocation for one pipeline.
///
/// `sequence` is 0 for the initial compile and increases with every rebuild
/// of the same watch session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildResult {
    pub pipeline: PipelineKind,
    pub sequence: u64,
    pub outcome: BuildOutcome,
}

impl BuildResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    pub fn is_initial(&self) -> bool {
        self.sequence == 0
    }
}

#[async_trait]
pub trait Compiler: Send + Sync {
    async fn compile(
        &self,
        descriptor: &PipelineDescriptor,
        config: &Value,
    ) -> Result<CompileStats, CompileError>;
}

/// Runs the configured compiler program once per invocation.
#[derive(Debug, Clone)]
pub struct CommandCompiler {
    root: PathBuf,
    state_dir: PathBuf,
    program: String,
    args: Vec<String>,
}

impl CommandCompiler {
    pub fn new(root: impl Into<PathBuf>, state_dir: impl AsRef<Path>, section: &CompilerSection) -> Self {
        let root = root.into();
        let state_dir = state_dir.as_ref();
        let state_dir = if state_dir.is_absolute() {
            state_dir.to_path_buf()
        } else {
            root.join(state_dir)
        };
        Self {
            root,
            state_dir,
            program: section.program.clone(),
            args: section.args.clone(),
        }
    }

    /// Where the configuration for `pipeline` is written before each run.
    pub fn config_path(&self, pipeline: PipelineKind) -> PathBuf {
        self.state_dir.join(format!("{}.config.json", pipeline))
    }

    fn render_args(&self, pipeline: PipelineKind, config_path: &Path) -> Vec<String> {
        let config_path = config_path.display().to_string();
        self.args
            .iter()
            .map(|arg| {
                arg.replace(CONFIG_PLACEHOLDER, &config_path)
                    .replace(PIPELINE_PLACEHOLDER, pipeline.as_str())
            })
            .collect()
    }

    async fn write_config(&self, pipeline: PipelineKind, config: &Value) -> Result<PathBuf, CompileError> {
        let path = self.config_path(pipeline);
        tokio::fs::create_dir_all(&self.state_dir).await.map_err(|e| {
            CompileError::new(
                pipeline,
                format!("cannot create {}: {}", self.state_dir.display(), e),
            )
        })?;

        let json = serde_json::to_vec_pretty(config).map_err(|e| {
            CompileError::new(pipeline, format!("cannot serialize configuration: {}", e))
        })?;
        tokio::fs::write(&path, json).await.map_err(|e| {
            CompileError::new(pipeline, format!("cannot write {}: {}", path.display(), e))
        })?;
        Ok(path)
    }
}

#[async_trait]
impl Compiler for CommandCompiler {
    async fn compile(
        &self,
        descriptor: &PipelineDescriptor,
        config: &Value,
    ) -> Result<CompileStats, CompileError> {
        let pipeline = descriptor.kind();
        let config_path = self.write_config(pipeline, config).await?;
        let args = self.render_args(pipeline, &config_path);

        tracing::debug!(pipeline = %pipeline, program = %self.program, ?args, "invoking compiler");

        let start = Instant::now();
        let output = Command::new(&self.program)
            .args(&args)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                CompileError::new(pipeline, format!("failed to launch '{}': {}", self.program, e))
            })?;
        let duration = start.elapsed();

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if output.status.success() {
            Ok(CompileStats {
                report: stdout,
                duration,
            })
        } else {
            let message = if stderr.is_empty() { stdout } else { stderr };
            let message = if message.is_empty() {
                format!("'{}' exited with {}", self.program, output.status)
            } else {
                message
            };
            Err(CompileError::new(pipeline, message).with_exit_code(output.status.code()))
        }
    }
}
