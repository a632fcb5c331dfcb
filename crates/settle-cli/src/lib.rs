//! Settle CLI - a dev server for any build command.
//!
//! `settle serve -- <build command>` runs the command whenever watched
//! sources change, mirrors its output directory into memory and serves it
//! through the settle middleware. Requests that arrive mid-build wait until
//! the build settles instead of getting stale or half-written files.
//!
//! # Architecture
//!
//! - [`cli`] - argument parsing
//! - [`config`] - layered configuration (defaults, `settle.toml`, `SETTLE_*`, flags)
//! - [`engine`] - [`engine::CommandEngine`], the build engine driving the command
//! - [`server`] - the axum router and server loop
//! - [`error`] - error types and miette conversion
//! - [`logger`] and [`ui`] - tracing setup and status lines

pub mod cli;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod logger;
pub mod server;
pub mod ui;

pub use error::{CliError, ConfigError, Result};
