//! Terminal status lines and formatting.
//!
//! ```no_run
//! use duplex_cli::ui;
//!
//! ui::init_colors(false);
//! ui::success("frontend compiled in 1.20s");
//! ui::error("backend compilation failed");
//! ```

mod format;
mod messages;

pub use format::{format_duration, indent};
pub use messages::{debug, error, info, success, warning};

use std::sync::atomic::{AtomicBool, Ordering};

static COLORS: AtomicBool = AtomicBool::new(false);

/// Respects `NO_COLOR` and `FORCE_COLOR`, then checks whether stderr is a terminal.
///
/// Shared by the status lines and the log output.
pub fn should_use_color() -> bool {
    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }
    if std::env::var("FORCE_COLOR").is_ok() {
        return true;
    }
    console::user_attended_stderr()
}

/// Decide once whether status lines are colored. Call early in `main`.
pub fn init_colors(no_color: bool) {
    COLORS.store(!no_color && should_use_color(), Ordering::Relaxed);
}

pub(crate) fn colors_enabled() -> bool {
    COLORS.load(Ordering::Relaxed)
}
