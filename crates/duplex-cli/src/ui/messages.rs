//! Status message functions for terminal output.
//!
//! Everything goes to stderr so stdout stays free for compiler reports.

use owo_colors::{OwoColorize, Style};

use super::colors_enabled;

fn mark(symbol: &str, style: Style) -> String {
    if colors_enabled() {
        symbol.style(style).to_string()
    } else {
        symbol.to_string()
    }
}

pub fn success(message: &str) {
    eprintln!("{} {}", mark("✓", Style::new().green().bold()), message);
}

pub fn info(message: &str) {
    eprintln!("{} {}", mark("ℹ", Style::new().blue().bold()), message);
}

pub fn warning(message: &str) {
    eprintln!("{} {}", mark("⚠", Style::new().yellow().bold()), message);
}

pub fn error(message: &str) {
    eprintln!("{} {}", mark("✗", Style::new().red().bold()), message);
}

/// Only printed with `DUPLEX_DEBUG` set.
pub fn debug(message: &str) {
    if std::env::var("DUPLEX_DEBUG").is_ok() {
        eprintln!("{} {}", mark("•", Style::new().dimmed()), message);
    }
}
