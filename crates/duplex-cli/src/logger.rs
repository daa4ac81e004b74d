//! Logging setup for the duplex CLI.
//!
//! The library crates emit structured `tracing` events; this module installs
//! the one subscriber that renders them.
//!
//! Filter precedence:
//! 1. `--verbose`: debug for the duplex crates
//! 2. `--quiet`: errors only
//! 3. `RUST_LOG`
//! 4. info for the duplex crates

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::ui;

const VERBOSE_FILTER: &str = "duplex_cli=debug,duplex_core=debug,duplex_config=debug";
const QUIET_FILTER: &str = "error";
const DEFAULT_FILTER: &str = "duplex_cli=info,duplex_core=info,duplex_config=info";

/// Build the filter for the given flags.
pub fn filter_for(verbose: bool, quiet: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else if quiet {
        EnvFilter::new(QUIET_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}

/// Initialize the global subscriber. Call once, before any logging.
///
/// # Example
///
/// ```rust,no_run
/// use duplex_cli::logger::init_logger;
///
/// init_logger(false, false, false);
/// tracing::info!("starting");
/// ```
pub fn init_logger(verbose: bool, quiet: bool, no_color: bool) {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_ansi(use_ansi(no_color))
        .with_writer(std::io::stderr)
        .compact();

    tracing_subscriber::registry()
        .with(filter_for(verbose, quiet))
        .with(fmt_layer)
        .init();
}

/// Log lines follow the same color decision as status lines.
fn use_ansi(no_color: bool) -> bool {
    !no_color && ui::should_use_color()
}
