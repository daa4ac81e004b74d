//! Command-line interface definition.
//!
//! Every lifecycle task is a subcommand with the same name:
//!
//! - `duplex clean-frontend` / `duplex clean-backend`
//! - `duplex frontend-build` / `duplex backend-build` / `duplex build`
//! - `duplex frontend-watch` / `duplex backend-watch` / `duplex watch`
//! - `duplex run`


use clap::{Parser, Subcommand};
use duplex_core::Task;
use std::path::PathBuf;

/// duplex - one project, two bundles
#[derive(Parser, Debug)]
#[command(
    name = "duplex",
    version,
    about = "Build, watch and run a frontend bundle and a backend bundle together",
    long_about = "duplex drives an external compiler over two pipelines: a browser bundle\n\
                  and a server bundle. Watch mode recompiles on change, serves the frontend\n\
                  with live reload and restarts the backend after every backend rebuild."
)]
pub struct Cli {
    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Project root (defaults to the current directory)
    #[arg(short = 'C', long, global = true, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Build in production mode, same as NODE_ENV=production
    #[arg(long, global = true)]
    pub production: bool,

    /// Task to execute
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Remove everything in the frontend output directory
    CleanFrontend,
    /// Remove everything in the backend output directory
    CleanBackend,
    /// Clean and compile the frontend bundle once
    FrontendBuild,
    /// Clean and compile the backend bundle once
    BackendBuild,
    /// Clean both outputs, then compile both bundles in parallel
    Build,
    /// Recompile the frontend on change and serve it with live reload
    FrontendWatch,
    /// Recompile the backend on change
    BackendWatch,
    /// Watch both pipelines and keep the backend server running
    Watch,
    /// Build, then run the backend under the production wrapper
    Run,
}

impl From<Command> for Task {
    fn from(command: Command) -> Self {
        match command {
            Command::CleanFrontend => Task::CleanFrontend,
            Command::CleanBackend => Task::CleanBackend,
            Command::FrontendBuild => Task::FrontendBuild,
            Command::BackendBuild => Task::BackendBuild,
            Command::Build => Task::Build,
            Command::FrontendWatch => Task::FrontendWatch,
            Command::BackendWatch => Task::BackendWatch,
            Command::Watch => Task::Watch,
            Command::Run => Task::Run,
        }
    }
}

impl Cli {
    pub fn task(&self) -> Task {
        self.command.into()
    }
}
