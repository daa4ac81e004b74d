//! Miette diagnostic conversion for CLI errors.

use crate::error::CliError;
use duplex_config::ConfigError;
use duplex_core::CoreError;
use miette::Report;

/// Convert CliError to miette Report
pub fn cli_error_to_miette(err: CliError) -> Report {
    match err {
        CliError::Config(e) => config_error_to_miette(e),
        CliError::Core(CoreError::Configuration(e)) => config_error_to_miette(e),
        CliError::Core(CoreError::ProcessSpawn { program, source }) => miette::miette!(
            help = "Check that the program is installed and the [server] section of duplex.toml points at it",
            "Failed to start '{}': {}",
            program,
            source
        ),
        other => miette::miette!("{}", other),
    }
}

fn config_error_to_miette(err: ConfigError) -> Report {
    match err {
        ConfigError::MalformedDescriptor { pipeline, reason } => miette::miette!(
            help = "Fix the [frontend]/[backend] sections of duplex.toml; nothing was built",
            "Malformed {} pipeline: {}",
            pipeline,
            reason
        ),
        ConfigError::InvalidValue { field, hint } => match hint {
            Some(hint) => miette::miette!(help = hint, "Invalid value for '{}'", field),
            None => miette::miette!("Invalid value for '{}'", field),
        },
        other => miette::miette!("Configuration error: {}", other),
    }
}
