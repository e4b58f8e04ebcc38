//! Terminal colors for CLI output.
//!
//! Colors are skipped when `NO_COLOR` is set.

use std::fmt::Display;
use std::io::{self, Write};
use std::sync::OnceLock;

pub const RESET: &str = "\x1b[0m";
pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";
pub const GREEN: &str = "\x1b[32m";
pub const YELLOW: &str = "\x1b[33m";
pub const CYAN: &str = "\x1b[36m";
pub const RED: &str = "\x1b[31m";

fn enabled() -> bool {
    static ENABLED: OnceLock<bool> = OnceLock::new();
    *ENABLED.get_or_init(|| std::env::var_os("NO_COLOR").is_none())
}

/// Wrap `text` in `color`.
pub fn paint(color: &str, text: impl Display) -> String {
    if enabled() {
        format!("{}{}{}", color, text, RESET)
    } else {
        text.to_string()
    }
}

/// Flush stdout so a progress line without a newline shows up.
#[inline]
pub fn flush_stdout() {
    io::stdout().flush().ok();
}
