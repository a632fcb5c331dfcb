//! Terminal status lines.
//!
//! ```no_run
//! use settle_cli::ui;
//!
//! ui::init_colors(false);
//! ui::success("Serving dist/ at http://127.0.0.1:8080/");
//! ui::warning("Skipping large file bundle.js.map");
//! ```

use owo_colors::OwoColorize;
use std::sync::atomic::{AtomicBool, Ordering};

static COLORS: AtomicBool = AtomicBool::new(true);

/// Decide once whether status lines are colored.
///
/// `--no-color` and `NO_COLOR` disable colors, `FORCE_COLOR` enables them
/// outside a terminal.
pub fn init_colors(no_color: bool) {
    COLORS.store(!no_color && should_use_color(), Ordering::Relaxed);
}

/// Check if color output should be enabled for stderr.
pub fn should_use_color() -> bool {
    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }
    if std::env::var("FORCE_COLOR").is_ok() {
        return true;
    }
    console::user_attended_stderr()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Success,
    Info,
    Warning,
    Error,
}

impl Status {
    fn symbol(self) -> &'static str {
        match self {
            Status::Success => "✓",
            Status::Info => "ℹ",
            Status::Warning => "⚠",
            Status::Error => "✗",
        }
    }

    fn render(self, message: &str, colors: bool) -> String {
        if !colors {
            return format!("{} {}", self.symbol(), message);
        }
        match self {
            Status::Success => format!("{} {}", self.symbol().green().bold(), message),
            Status::Info => format!("{} {}", self.symbol().blue().bold(), message),
            Status::Warning => format!("{} {}", self.symbol().yellow().bold(), message.yellow()),
            Status::Error => format!("{} {}", self.symbol().red().bold(), message.red()),
        }
    }
}

fn emit(status: Status, message: &str) {
    eprintln!("{}", status.render(message, COLORS.load(Ordering::Relaxed)));
}

/// Print a success message to stderr.
pub fn success(message: &str) {
    emit(Status::Success, message);
}

/// Print an info message to stderr.
pub fn info(message: &str) {
    emit(Status::Info, message);
}

/// Print a warning message to stderr.
pub fn warning(message: &str) {
    emit(Status::Warning, message);
}

/// Print an error message to stderr.
pub fn error(message: &str) {
    emit(Status::Error, message);
}
