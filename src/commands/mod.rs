//! Command implementations for the purr CLI
//!
//! - **install**: install, update, upgrade, downgrade and uninstall
//! - **query**: registry lookups (search, list, info, versions, stats,
//!   categories) and local state (`list --installed`, config)

pub mod install;
pub mod query;

pub use install::{downgrade, install, uninstall, update, upgrade};
pub use query::{categories, config, info, list, search, stats, versions};

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

pub(crate) fn is_tty() -> bool {
    std::io::IsTerminal::is_terminal(&std::io::stdout())
}

/// Spinner for registry round-trips; hidden when stdout is not a terminal
pub(crate) fn spinner(message: impl Into<String>) -> ProgressBar {
    if !is_tty() {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.into());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
