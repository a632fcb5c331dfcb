//! Errors raised while installing the middleware.
//!
//! Request handling itself never fails: unresolvable paths, missing files and
//! read errors all fall through to the next handler. Only setup can fail.

use thiserror::Error;

/// Fatal configuration problems detected by [`crate::DevMiddleware::new`].
#[derive(Debug, Error)]
pub enum SetupError {
    /// A build target writes to a relative path.
    ///
    /// The virtual filesystem is addressed by absolute paths only.
    #[error("output path `{0}` needs to be an absolute path or `/`")]
    RelativeOutputPath(String),

    /// The drain phase is scheduled on tokio, so a runtime must be running.
    #[error("no tokio runtime is running; create the middleware from within a runtime")]
    NoRuntime,

    /// A configured custom header has an invalid name or value.
    #[error("invalid header `{name}`: {reason}")]
    InvalidHeader { name: String, reason: String },

    /// The `filename` filter could not be compiled to a regular expression.
    #[error("invalid filename filter: {0}")]
    InvalidFilenamePattern(#[from] regex::Error),
}

/// The middleware was closed before the awaited build settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("middleware closed before the build became valid")]
pub struct ClosedError;
