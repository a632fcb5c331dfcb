//! Command-line interface definition.
//!
//! - `settle serve -- <build command>` - serve a build command's output with
//!   watch-mode rebuilds

mod commands;
mod validation;

use clap::Parser;

pub use commands::{Command, ServeArgs};
pub use validation::{parse_header, parse_index};

/// Settle - serve build output from memory while it rebuilds
#[derive(Parser, Debug)]
#[command(
    name = "settle",
    version,
    about = "Serve a build command's output from memory, holding requests while it rebuilds",
    long_about = "Settle runs your build command whenever watched sources change and serves the\n\
                  output directory from memory. Requests that arrive during a rebuild wait for\n\
                  the build to finish instead of receiving stale or partial files."
)]
pub struct Cli {
    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    ///
    /// Also silences the compile status reporter.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}
