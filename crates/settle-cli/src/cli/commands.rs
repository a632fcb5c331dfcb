use clap::{Args, Subcommand};
use settle::IndexPolicy;
use std::path::PathBuf;

use crate::cli::validation::{parse_header, parse_index};

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a dev server for a build command
    ///
    /// Runs the command once at startup and again whenever a watched file
    /// changes, then serves the output directory from memory.
    ///
    /// Examples:
    ///   settle serve -- npm run build
    ///   settle serve --out-dir public --public-path /assets/ -- make
    Serve(ServeArgs),
}

/// Arguments for the serve command
///
/// Every option is optional here; unset options fall back to `settle.toml`,
/// `SETTLE_*` environment variables and built-in defaults, in that order.
#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Configuration file (defaults to ./settle.toml when present)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Address to bind
    #[arg(long)]
    pub host: Option<String>,

    /// URL prefix the build output is served under
    #[arg(long, value_name = "PATH")]
    pub public_path: Option<String>,

    /// Directory the build command writes to
    #[arg(short, long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Directory to watch for changes (repeatable, defaults to the working directory)
    #[arg(short, long, value_name = "DIR")]
    pub watch: Vec<PathBuf>,

    /// Build on request instead of watching
    #[arg(long)]
    pub lazy: bool,

    /// In lazy mode, only requests for this file name trigger a build
    ///
    /// `[name]`-style placeholders match any text, e.g. `[name].js`.
    #[arg(long, value_name = "NAME")]
    pub filename: Option<String>,

    /// Directory index file, or `false` to disable directory requests
    #[arg(long, value_name = "FILE", value_parser = parse_index)]
    pub index: Option<IndexPolicy>,

    /// Extra response header (repeatable)
    #[arg(long = "header", value_name = "NAME=VALUE", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Build command, run through the platform shell
    #[arg(last = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

impl ServeArgs {
    /// The build command as one shell line, if one was given.
    pub fn command_line(&self) -> Option<String> {
        (!self.command.is_empty()).then(|| self.command.join(" "))
    }
}
