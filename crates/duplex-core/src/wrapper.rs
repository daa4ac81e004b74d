//! Production run: the backend bundle handed to an always-restart wrapper.
//!
//! The engine does not supervise anything in this mode. It spawns the wrapper
//! with inherited stdio, waits for it, and reports its exit code as the run's.

use duplex_config::{PipelineDescriptor, RunConfig, ServerSection};
use std::path::{Path, PathBuf};

use crate::error::{CoreError, Result};
use crate::lifecycle::Shutdown;
use crate::supervisor::CommandLauncher;

/// How the wrapped process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapperExit {
    Exited(Option<i32>),
    /// The run was interrupted and the wrapper was terminated.
    Interrupted,
}

#[derive(Debug, Clone)]
pub struct ProductionWrapper {
    launcher: CommandLauncher,
}

impl ProductionWrapper {
    /// `wrapper... <backend output>/<script>`, with `PORT` set for the server.
    pub fn new(
        root: &Path,
        server: &ServerSection,
        backend: &PipelineDescriptor,
        run: &RunConfig,
    ) -> Result<Self> {
        let script = script_path(backend, &server.script);
        let launcher = CommandLauncher::from_command_line(&server.wrapper, root)
            .ok_or_else(|| {
                CoreError::Configuration(duplex_config::ConfigError::InvalidValue {
                    field: "server.wrapper".to_string(),
                    hint: Some("the wrapper command cannot be empty".to_string()),
                })
            })?
            .arg(script.display().to_string())
            .env("PORT", run.ports.http_server.to_string())
            .env("NODE_ENV", run.mode().node_env());
        Ok(Self { launcher })
    }

    pub fn program(&self) -> &str {
        self.launcher.program()
    }

    /// Run the wrapper until it exits or `shutdown` fires.
    pub async fn run(&self, mut shutdown: Shutdown) -> Result<WrapperExit> {
        let mut child = self.launcher.spawn()?;
        tracing::info!(program = %self.launcher.program(), pid = ?child.id(), "production wrapper started");

        tokio::select! {
            status = child.wait() => {
                let status = status.map_err(|e| CoreError::spawn(self.launcher.program(), e))?;
                Ok(WrapperExit::Exited(status.code()))
            }
            _ = shutdown.wait() => {
                if let Err(e) = child.kill().await {
                    tracing::warn!(error = %e, "failed to terminate production wrapper");
                }
                Ok(WrapperExit::Interrupted)
            }
        }
    }
}

/// Path of the backend bundle the server runs.
pub fn script_path(backend: &PipelineDescriptor, script: &str) -> PathBuf {
    backend.output_dir().join(script)
}

#[cfg(test)]
mod tests {
    use super::*;
    use duplex_config::{DescriptorBuilder, ProjectConfig};
    use tempfile::TempDir;

    fn wrapper_for(root: &Path, wrapper: &[&str]) -> Result<ProductionWrapper> {
        let run = RunConfig::development().with_production(true);
        let mut project = ProjectConfig::default();
        project.server.wrapper = wrapper.iter().map(|s| s.to_string()).collect();
        let pipelines = DescriptorBuilder::new(root, &run, &project).pipelines()?;
        ProductionWrapper::new(root, &project.server, &pipelines.backend, &run)
    }

    #[test]
    fn empty_wrapper_is_a_configuration_error() {
        let dir = TempDir::new().unwrap();
        let err = wrapper_for(dir.path(), &[]).unwrap_err();
        assert!(matches!(err, CoreError::Configuration(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exit_code_is_forwarded() {
        let dir = TempDir::new().unwrap();
        // `sh -c 'exit 7' <script>`: the script path lands in $0.
        let wrapper = wrapper_for(dir.path(), &["sh", "-c", "exit 7"]).unwrap();
        let (_trigger, shutdown) = Shutdown::new();
        let exit = wrapper.run(shutdown).await.unwrap();
        assert_eq!(exit, WrapperExit::Exited(Some(7)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn port_is_exported() {
        let dir = TempDir::new().unwrap();
        let wrapper = wrapper_for(dir.path(), &["sh", "-c", "test \"$PORT\" = 4000"]).unwrap();
        let (_trigger, shutdown) = Shutdown::new();
        let exit = wrapper.run(shutdown).await.unwrap();
        assert_eq!(exit, WrapperExit::Exited(Some(0)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn interrupt_terminates_wrapper() {
        let dir = TempDir::new().unwrap();
        let wrapper = wrapper_for(dir.path(), &["sh", "-c", "sleep 30"]).unwrap();
        let (trigger, shutdown) = Shutdown::new();

        let run = tokio::spawn(async move { wrapper.run(shutdown).await });
        trigger.trigger();
        let exit = run.await.unwrap().unwrap();
        assert_eq!(exit, WrapperExit::Interrupted);
    }

    #[tokio::test]
    async fn missing_wrapper_is_a_spawn_error() {
        let dir = TempDir::new().unwrap();
        let wrapper = wrapper_for(dir.path(), &["./node_modules/.bin/forever"]).unwrap();
        let (_trigger, shutdown) = Shutdown::new();
        let err = wrapper.run(shutdown).await.unwrap_err();
        assert!(matches!(err, CoreError::ProcessSpawn { .. }));
    }
}
