//! Configuration layer for duplex.
//!
//! Everything a run needs before the first compiler invocation lives here:
//!
//! - [`compose`] - side-effect-free merging of a base configuration with overrides
//! - [`RunConfig`] - the run-mode snapshot read once from the environment
//! - [`ProjectConfig`] - the optional `duplex.toml` project file
//! - [`Mode`] and [`Step`] - the declarative per-mode step table
//! - [`PipelineDescriptor`] - immutable frontend/backend pipeline descriptions
//! - [`scan_externals`] - runtime-resolved dependencies for the backend bundle

pub mod compose;
pub mod descriptor;
pub mod error;
pub mod externals;
pub mod mode;
pub mod project;
pub mod settings;

pub use compose::{compose, compose_all};
pub use descriptor::{DescriptorBuilder, PipelineDescriptor, PipelineKind, Pipelines};
pub use error::{ConfigError, Result};
pub use externals::scan_externals;
pub use mode::{Mode, Step};
pub use project::{
    CompilerSection, OverrideSection, PipelineSection, ProjectConfig, ServerSection,
    PROJECT_FILE,
};
pub use settings::{Ports, RunConfig};
