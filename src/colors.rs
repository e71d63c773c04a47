//! Terminal color policy.
//!
//! | variable              | effect                         |
//! |-----------------------|--------------------------------|
//! | `NO_COLOR` (any)      | never color                    |
//! | `CLICOLOR_FORCE` != 0 | always color, even when piped  |
//! | `CLICOLOR=0`          | never color                    |
//!
//! Without any of them, color follows whether stdout is a terminal.

use colored::control;

fn env_is(name: &str, pred: impl Fn(&str) -> bool) -> bool {
    std::env::var(name).map(|v| pred(&v)).unwrap_or(false)
}

/// Whether output should be colored, given the TTY state of stdout
pub fn color_override(stdout_is_tty: bool) -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    if env_is("CLICOLOR_FORCE", |v| v != "0") {
        return true;
    }
    if env_is("CLICOLOR", |v| v == "0") {
        return false;
    }
    stdout_is_tty
}

/// Apply the color policy for the whole process. Call once, early in main.
pub fn init_colors() {
    let is_tty = std::io::IsTerminal::is_terminal(&std::io::stdout());
    control::set_override(color_override(is_tty));
}
