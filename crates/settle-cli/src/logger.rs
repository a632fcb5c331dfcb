//! Logging setup for the settle CLI.
//!
//! Diagnostics from the settle crates go through `tracing`. `--verbose`
//! turns on debug output, `--quiet` keeps errors only, and otherwise
//! `RUST_LOG` wins over the info-level default.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const VERBOSE_FILTER: &str = "settle=debug,settle_axum=debug,settle_cli=debug";
const QUIET_FILTER: &str = "settle=error,settle_axum=error,settle_cli=error";
const DEFAULT_FILTER: &str = "settle=info,settle_axum=info,settle_cli=info";

/// Initialize the global tracing subscriber.
///
/// Call once, before anything logs.
pub fn init_logger(verbose: bool, quiet: bool, no_color: bool) {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_ansi(!no_color)
        .compact();

    tracing_subscriber::registry()
        .with(filter_for(verbose, quiet))
        .with(fmt_layer)
        .init();
}

fn filter_for(verbose: bool, quiet: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else if quiet {
        EnvFilter::new(QUIET_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}
