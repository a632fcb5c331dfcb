//! Output sinks and compile-status reporting.
//!
//! All user-facing output of the middleware goes through three sinks
//! (`log`, `warn`, `error`). By default they forward to `tracing`, so the host
//! application's subscriber decides where the lines end up.

use crate::engine::BuildResult;
use crate::options::{StatsOptions, StatsPreset};
use chrono::Local;
use std::fmt;
use std::sync::Arc;

type Sink = Arc<dyn Fn(&str) + Send + Sync>;

/// The `log`, `warn` and `error` output functions.
#[derive(Clone)]
pub struct LogSinks {
    log: Sink,
    warn: Sink,
    error: Sink,
}

impl LogSinks {
    pub fn new(
        log: impl Fn(&str) + Send + Sync + 'static,
        warn: impl Fn(&str) + Send + Sync + 'static,
        error: impl Fn(&str) + Send + Sync + 'static,
    ) -> Self {
        Self {
            log: Arc::new(log),
            warn: Arc::new(warn),
            error: Arc::new(error),
        }
    }

    /// Sinks that forward to `tracing` at info, warn and error level.
    pub fn tracing() -> Self {
        Self::new(
            |line| tracing::info!("{line}"),
            |line| tracing::warn!("{line}"),
            |line| tracing::error!("{line}"),
        )
    }

    /// Sinks that discard everything.
    pub fn silent() -> Self {
        Self::new(|_| {}, |_| {}, |_| {})
    }

    pub fn log(&self, line: &str) {
        (self.log)(line);
    }

    pub fn warn(&self, line: &str) {
        (self.warn)(line);
    }

    pub fn error(&self, line: &str) {
        (self.error)(line);
    }
}

impl Default for LogSinks {
    fn default() -> Self {
        Self::tracing()
    }
}

impl fmt::Debug for LogSinks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSinks").finish_non_exhaustive()
    }
}

/// Reporter-relevant subset of the middleware options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReporterOptions {
    pub report_time: bool,
    pub no_info: bool,
    pub quiet: bool,
}

/// Everything a [`Reporter`] is told about a state change.
pub struct ReportArgs<'a> {
    /// `true` once a build settled, `false` when a new one started
    pub state: bool,
    /// The settled build; `None` while compiling
    pub result: Option<&'a BuildResult>,
    pub options: ReporterOptions,
    pub stats: &'a StatsOptions,
    pub sinks: &'a LogSinks,
}

/// Reports build state transitions.
pub trait Reporter: Send + Sync {
    fn report(&self, args: &ReportArgs<'_>);
}

/// Prints build stats and a one-line compile status.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultReporter;

impl Reporter for DefaultReporter {
    fn report(&self, args: &ReportArgs<'_>) {
        let options = args.options;
        let time = if options.report_time {
            format!("[{}] ", Local::now().format("%H:%M:%S"))
        } else {
            String::new()
        };

        if !args.state {
            args.sinks.log(&format!("{time}settle: Compiling..."));
            return;
        }

        let Some(result) = args.result else {
            return;
        };
        let has_errors = result.has_errors();
        let has_warnings = result.has_warnings();

        let mut display_stats = !options.quiet && args.stats.preset != StatsPreset::None;
        if options.no_info && !has_errors && !has_warnings {
            display_stats = false;
        }

        if display_stats {
            let rendered = result.render(args.stats);
            if has_errors {
                args.sinks.error(&rendered);
            } else if has_warnings {
                args.sinks.warn(&rendered);
            } else {
                args.sinks.log(&rendered);
            }
        }

        if !options.no_info && !options.quiet {
            let message = if has_errors {
                "Failed to compile."
            } else if has_warnings {
                "Compiled with warnings."
            } else {
                "Compiled successfully."
            };
            args.sinks.log(&format!("{time}settle: {message}"));
        }
    }
}
