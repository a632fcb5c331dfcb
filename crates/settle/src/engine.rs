//! Build engine interface.
//!
//! The middleware does not build anything itself. It consumes a [`BuildEngine`]
//! as an event source: the engine reports when a build starts or is
//! invalidated and when it finishes, and accepts single-shot `run` and
//! continuous `watch` requests.

use crate::options::{StatsOptions, WatchOptions};
use crate::vfs::VirtualFs;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Output mapping of one independent build target.
///
/// Both paths default to `/` when absent or empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOutputDescriptor {
    /// URL prefix the target's artifacts are reachable under
    pub public_path: Option<String>,
    /// Absolute virtual filesystem path the target writes to
    pub output_path: Option<String>,
}

impl BuildOutputDescriptor {
    pub fn new(public_path: impl Into<String>, output_path: impl Into<String>) -> Self {
        Self {
            public_path: Some(public_path.into()),
            output_path: Some(output_path.into()),
        }
    }

    /// Descriptor with only an output path; the public path defaults to `/`.
    pub fn with_output_path(output_path: impl Into<String>) -> Self {
        Self {
            public_path: None,
            output_path: Some(output_path.into()),
        }
    }

    /// Public path with the `/` default applied.
    pub fn public_path(&self) -> &str {
        non_empty_or_root(self.public_path.as_deref())
    }

    /// Output path with the `/` default applied.
    pub fn output_path(&self) -> &str {
        non_empty_or_root(self.output_path.as_deref())
    }
}

pub(crate) fn non_empty_or_root(value: Option<&str>) -> &str {
    match value {
        Some(value) if !value.is_empty() => value,
        _ => "/",
    }
}

/// The build targets an engine produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutputs {
    /// A single build target
    Single(BuildOutputDescriptor),
    /// Several independent targets built together.
    ///
    /// `output_path` is the primary output path used when a request matches
    /// none of the targets' public paths.
    Multi {
        output_path: Option<String>,
        targets: Vec<BuildOutputDescriptor>,
    },
}

impl BuildOutputs {
    /// Primary output path with the `/` default applied.
    pub fn primary_output_path(&self) -> &str {
        match self {
            BuildOutputs::Single(descriptor) => descriptor.output_path(),
            BuildOutputs::Multi { output_path, .. } => non_empty_or_root(output_path.as_deref()),
        }
    }

    /// Every output path the engine writes to, primary first.
    pub fn output_paths(&self) -> Vec<&str> {
        match self {
            BuildOutputs::Single(descriptor) => vec![descriptor.output_path()],
            BuildOutputs::Multi { targets, .. } => std::iter::once(self.primary_output_path())
                .chain(targets.iter().map(BuildOutputDescriptor::output_path))
                .collect(),
        }
    }
}

/// Result of a completed build.
pub trait BuildStats: Send + Sync + fmt::Debug {
    fn has_errors(&self) -> bool;

    fn has_warnings(&self) -> bool;

    /// Human-readable summary of the build, shaped by `options`.
    fn render(&self, options: &StatsOptions) -> String;
}

/// Shared handle to the most recent build result.
pub type BuildResult = Arc<dyn BuildStats>;

/// Error delivered to `run`/`watch` callbacks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct EngineError {
    pub message: String,
    /// Full trace, reported in place of `message` when present
    pub stack: Option<String>,
    /// Secondary payload reported after the main message
    pub details: Option<String>,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
            details: None,
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Completion callback for [`BuildEngine::run`] and [`BuildEngine::watch`].
pub type EngineCallback = Arc<dyn Fn(Result<(), EngineError>) + Send + Sync>;

/// Named lifecycle callbacks registered once with [`BuildEngine::subscribe`].
#[derive(Clone)]
pub struct LifecycleHooks {
    /// Fired when a build starts (single-shot or watch) or the watcher
    /// invalidates the current output.
    pub invalid: Arc<dyn Fn() + Send + Sync>,
    /// Fired when a build finishes.
    pub done: Arc<dyn Fn(BuildResult) + Send + Sync>,
}

impl LifecycleHooks {
    pub fn new(
        invalid: impl Fn() + Send + Sync + 'static,
        done: impl Fn(BuildResult) + Send + Sync + 'static,
    ) -> Self {
        Self {
            invalid: Arc::new(invalid),
            done: Arc::new(done),
        }
    }
}

impl fmt::Debug for LifecycleHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleHooks").finish_non_exhaustive()
    }
}

/// Control handle of a continuous watch session.
pub trait WatchHandle: Send + Sync {
    /// Mark the current output stale and schedule a rebuild.
    fn invalidate(&self);

    /// Stop watching; `done` runs once the watcher has shut down.
    fn close(&self, done: Box<dyn FnOnce() + Send>);
}

/// An incremental build engine.
pub trait BuildEngine: Send + Sync {
    /// Output mapping of the engine's build targets.
    fn outputs(&self) -> BuildOutputs;

    /// Register lifecycle callbacks.
    fn subscribe(&self, hooks: LifecycleHooks);

    /// Run a single build. Must not block; completion is signalled through
    /// the `done` hook and `callback`.
    fn run(&self, callback: EngineCallback);

    /// Start watching and rebuilding continuously.
    fn watch(&self, options: &WatchOptions, callback: EngineCallback) -> Box<dyn WatchHandle>;

    /// The filesystem the engine writes to, if it brings one.
    fn output_file_system(&self) -> Option<Arc<dyn VirtualFs>>;

    /// Install the filesystem the engine should write to.
    fn set_output_file_system(&self, fs: Arc<dyn VirtualFs>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_defaults() {
        let descriptor = BuildOutputDescriptor::default();
        assert_eq!(descriptor.public_path(), "/");
        assert_eq!(descriptor.output_path(), "/");

        let empty = BuildOutputDescriptor::new("", "");
        assert_eq!(empty.public_path(), "/");
        assert_eq!(empty.output_path(), "/");

        let set = BuildOutputDescriptor::new("/js/", "/dist");
        assert_eq!(set.public_path(), "/js/");
        assert_eq!(set.output_path(), "/dist");
    }

    #[test]
    fn test_output_paths_primary_first() {
        let outputs = BuildOutputs::Multi {
            output_path: Some("/root".to_string()),
            targets: vec![
                BuildOutputDescriptor::new("/js/", "/foo"),
                BuildOutputDescriptor::new("/css/", "/bar"),
            ],
        };
        assert_eq!(outputs.primary_output_path(), "/root");
        assert_eq!(outputs.output_paths(), vec!["/root", "/foo", "/bar"]);
    }

    #[test]
    fn test_engine_error_builder() {
        let err = EngineError::new("boom")
            .with_stack("Error: boom\n  at build")
            .with_details("module not found");
        assert_eq!(err.to_string(), "boom");
        assert_eq!(err.stack.as_deref(), Some("Error: boom\n  at build"));
        assert_eq!(err.details.as_deref(), Some("module not found"));
    }
}
