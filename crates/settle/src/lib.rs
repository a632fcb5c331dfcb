//! Settle - serve a build engine's in-memory output while it rebuilds.
//!
//! Settle sits between an incremental build engine and HTTP clients. It tracks
//! whether the engine's last build is still current, holds requests back while
//! a build is in flight, maps request URLs onto artifact paths and answers with
//! the artifact bytes (byte ranges included).
//!
//! # Architecture
//!
//! - [`resolve`] maps a request URL onto an artifact path, across one or many
//!   build targets.
//! - [`locate`] finds the concrete file for a path (index fallback for
//!   directories).
//! - [`coordinator`] owns build validity and the queue of deferred requests.
//! - [`respond`] turns a file into an `http::Response` with range support.
//! - [`gate`] composes the above into [`DevMiddleware`], the framework-agnostic
//!   request handler. Framework bindings (such as `settle-axum`) wrap it.
//!
//! # Example
//!
//! ```rust,no_run
//! use settle::{BuildEngine, DevMiddleware, GateOutcome, MiddlewareOptions};
//! use std::sync::Arc;
//!
//! # async fn example(engine: Arc<dyn BuildEngine>) -> Result<(), settle::SetupError> {
//! let middleware = DevMiddleware::new(engine, MiddlewareOptions::default())?;
//!
//! match middleware.handle(&http::Method::GET, "/bundle.js", None).await {
//!     GateOutcome::Respond(response) => println!("{} bytes", response.body().len()),
//!     GateOutcome::Next { .. } => println!("not a build artifact"),
//!     GateOutcome::Unavailable => println!("middleware closed"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod coordinator;
pub mod engine;
pub mod error;
pub mod gate;
pub mod locate;
pub mod mime;
pub mod options;
pub mod range;
pub mod report;
pub mod resolve;
pub mod respond;
pub mod vfs;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use coordinator::{Continuation, Coordinator};
pub use engine::{
    BuildEngine, BuildOutputDescriptor, BuildOutputs, BuildResult, BuildStats, EngineCallback,
    EngineError, LifecycleHooks, WatchHandle,
};
pub use error::{ClosedError, SetupError};
pub use gate::{DevMiddleware, GateOutcome};
pub use locate::locate;
pub use mime::MimeRegistry;
pub use options::{
    FilenameFilter, IndexPolicy, MiddlewareOptions, StatsOptions, StatsPreset, WatchOptions,
};
pub use range::{ByteRange, RangeOutcome, parse_range};
pub use report::{DefaultReporter, LogSinks, ReportArgs, Reporter, ReporterOptions};
pub use resolve::{join_path, resolve};
pub use respond::Responder;
pub use vfs::{FileKind, FileStat, MemoryFs, VfsError, VirtualFs};
