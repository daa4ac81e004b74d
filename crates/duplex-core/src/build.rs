//! One-shot builds.

use duplex_config::PipelineDescriptor;
use std::sync::Arc;

use crate::clean::purge_output_dir;
use crate::compiler::{BuildOutcome, BuildResult, Compiler};
use crate::reporter::Reporter;

/// Purges, compiles and reports a single pipeline.
///
/// A compile failure is a value, not an error: [`BuildRunner::build`] always
/// returns exactly one [`BuildResult`], so callers joining several builds
/// never hang on a failed sibling.
#[derive(Clone)]
pub struct BuildRunner {
    compiler: Arc<dyn Compiler>,
    reporter: Arc<dyn Reporter>,
}

impl BuildRunner {
    pub fn new(compiler: Arc<dyn Compiler>, reporter: Arc<dyn Reporter>) -> Self {
        Self { compiler, reporter }
    }

    pub fn compiler(&self) -> &Arc<dyn Compiler> {
        &self.compiler
    }

    pub fn reporter(&self) -> &Arc<dyn Reporter> {
        &self.reporter
    }

    /// Best-effort purge of the pipeline's output directory.
    pub async fn clean(&self, descriptor: &PipelineDescriptor) -> usize {
        let dir = descriptor.output_dir();
        match purge_output_dir(dir).await {
            Ok(removed) => {
                self.reporter.cleaned(descriptor.kind(), dir, removed);
                removed
            }
            Err(e) => {
                tracing::warn!(pipeline = %descriptor.kind(), error = %e, "purge failed, building anyway");
                0
            }
        }
    }

    /// Purge then compile once.
    pub async fn build(&self, descriptor: &PipelineDescriptor) -> BuildResult {
        self.clean(descriptor).await;
        self.compile(descriptor, 0).await
    }

    /// Compile without purging; used for every rebuild of a watch session.
    pub(crate) async fn compile(&self, descriptor: &PipelineDescriptor, sequence: u64) -> BuildResult {
        let pipeline = descriptor.kind();
        let config = descriptor.materialize();

        self.reporter.build_started(pipeline, sequence);
        let outcome = BuildOutcome::from(self.compiler.compile(descriptor, &config).await);

        let result = BuildResult {
            pipeline,
            sequence,
            outcome,
        };
        self.reporter.build_finished(&result);
        result
    }
}
