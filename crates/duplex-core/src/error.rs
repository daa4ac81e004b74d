//! Error taxonomy for the orchestration engine.
//!
//! Configuration, spawn and I/O errors are fatal to the run. Compile failures
//! are not: they travel inside [`BuildOutcome::Failure`](crate::BuildOutcome)
//! and never cross a composite task as an `Err`.

use std::path::PathBuf;

use duplex_config::ConfigError;
use thiserror::Error;

pub use crate::compiler::CompileError;

pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed descriptor or override, raised before any compiler runs.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Only produced when a caller chooses to treat a failed build as fatal.
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// The backend process or the production wrapper could not be launched.
    #[error("failed to launch '{program}': {source}")]
    ProcessSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The filesystem watch broke; the session keeps running without it.
    #[error("watching {} failed: {source}", .path.display())]
    WatchIo {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CoreError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn spawn(program: impl Into<String>, source: std::io::Error) -> Self {
        CoreError::ProcessSpawn {
            program: program.into(),
            source,
        }
    }

    /// Whether this error ends the run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, CoreError::Compile(_) | CoreError::WatchIo { .. })
    }
}
