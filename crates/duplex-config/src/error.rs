//! Error types for configuration loading and descriptor construction.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Configuration errors are fatal: they abort a run before any compiler
/// invocation happens.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("project file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("invalid config value for '{field}'{}", hint_suffix(.hint))]
    InvalidValue { field: String, hint: Option<String> },

    #[error("malformed {pipeline} pipeline: {reason}")]
    MalformedDescriptor { pipeline: String, reason: String },

    #[error("failed to read run settings: {0}")]
    Settings(#[from] Box<figment::Error>),

    #[error("I/O error while reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    pub(crate) fn malformed(pipeline: impl ToString, reason: impl Into<String>) -> Self {
        ConfigError::MalformedDescriptor {
            pipeline: pipeline.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::Io {
            path: path.into(),
            source,
        }
    }
}

fn hint_suffix(hint: &Option<String>) -> String {
    match hint {
        Some(hint) => format!(": {hint}"),
        None => String::new(),
    }
}
