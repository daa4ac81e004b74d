//! duplex CLI.
//!
//! Exposes the nine lifecycle tasks of `duplex-core` as subcommands and adds
//! what only makes sense in a terminal session:
//!
//! - [`error`] - CLI error type and miette rendering of fatal errors
//! - [`logger`] - `tracing` subscriber setup driven by the global flags
//! - [`ui`] - status lines and formatting
//! - [`reporter`] - terminal rendering of compiler results and server status
//! - [`dev`] - the development server run alongside frontend watch sessions
//!
//! # Example
//!
//! ```rust,no_run
//! use clap::Parser;
//! use duplex_cli::{cli::Cli, commands};
//!
//! # async fn demo() -> duplex_cli::Result<()> {
//! let args = Cli::parse_from(["duplex", "build"]);
//! let code = commands::execute(args).await?;
//! assert_eq!(code, 0);
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod commands;
pub mod dev;
pub mod error;
pub mod logger;
pub mod reporter;
pub mod ui;

pub use error::{CliError, Result, ResultExt};
