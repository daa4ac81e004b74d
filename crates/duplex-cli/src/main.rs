//! duplex - build, watch and run a browser bundle and a server bundle together.
//!
//! Parses the command line, initializes logging and hands the task to the
//! lifecycle. The process exits with the task's exit code.

use clap::Parser;
use duplex_cli::{cli, commands, error, logger, ui};
use miette::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    logger::init_logger(args.verbose, args.quiet, args.no_color);
    ui::init_colors(args.no_color);

    let code = commands::execute(args)
        .await
        .map_err(error::cli_error_to_miette)?;

    std::process::exit(code);
}
