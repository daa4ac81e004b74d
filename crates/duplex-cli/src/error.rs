//! Error handling for the duplex CLI.
//!
//! Library errors convert into [`CliError`] via `#[from]`; `main` renders the
//! result as a miette report. Variants that the user can act on carry a hint.
//!
//! A failed compile is not an error here: it is reported as it happens and
//! turns into a non-zero exit code, never into a [`CliError`].

use std::path::PathBuf;
use thiserror::Error;

mod miette;

pub use self::miette::cli_error_to_miette;

#[derive(Debug, Error)]
pub enum CliError {
    /// Project file or run settings could not be used.
    #[error("Configuration error: {0}")]
    Config(#[from] duplex_config::ConfigError),

    /// The engine could not run the task.
    #[error("{0}")]
    Core(#[from] duplex_core::CoreError),

    #[error("Directory not found: {}\n\nHint: Check the --cwd argument", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Development server errors.
    #[error("Server error: {0}")]
    Server(String),

    #[error("{0}")]
    Custom(String),
}

pub type Result<T, E = CliError> = std::result::Result<T, E>;

/// Extension trait for adding context to `Result` types.
pub trait ResultExt<T> {
    /// Turn a not-found I/O error into [`CliError::DirectoryNotFound`] for `path`.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use std::path::Path;
    /// # use duplex_cli::error::{Result, ResultExt};
    /// # fn run() -> Result<()> {
    /// let root = Path::new("missing-project");
    /// std::fs::canonicalize(root).with_path(root)?;
    /// # Ok(())
    /// # }
    /// ```
    fn with_path(self, path: impl AsRef<std::path::Path>) -> Result<T>;

    fn with_hint(self, hint: impl std::fmt::Display) -> Result<T>;

    fn context(self, msg: impl std::fmt::Display) -> Result<T>;
}

impl<T, E: Into<CliError>> ResultExt<T> for std::result::Result<T, E> {
    fn with_path(self, path: impl AsRef<std::path::Path>) -> Result<T> {
        self.map_err(|e| match e.into() {
            CliError::Io(io_err) if io_err.kind() == std::io::ErrorKind::NotFound => {
                CliError::DirectoryNotFound(path.as_ref().to_path_buf())
            }
            other => other,
        })
    }

    fn with_hint(self, hint: impl std::fmt::Display) -> Result<T> {
        self.map_err(|e| {
            let err: CliError = e.into();
            CliError::Custom(format!("{}\n\nHint: {}", err, hint))
        })
    }

    fn context(self, msg: impl std::fmt::Display) -> Result<T> {
        self.map_err(|e| {
            let err: CliError = e.into();
            CliError::Custom(format!("{}: {}", msg, err))
        })
    }
}
