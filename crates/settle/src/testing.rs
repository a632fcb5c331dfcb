//! Test support: a scripted build engine, canned build results and log capture.
//!
//! Available in unit tests and, with the `test-utils` feature, to downstream
//! crates' tests.

use crate::engine::{
    BuildEngine, BuildOutputs, BuildResult, BuildStats, EngineCallback, EngineError,
    LifecycleHooks, WatchHandle,
};
use crate::options::{StatsOptions, StatsPreset, WatchOptions};
use crate::report::LogSinks;
use crate::vfs::VirtualFs;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A build result with fixed flags.
#[derive(Debug, Clone, Default)]
pub struct FakeStats {
    pub errors: bool,
    pub warnings: bool,
    pub text: String,
}

impl FakeStats {
    pub fn clean() -> BuildResult {
        Arc::new(Self {
            text: "bundle.js  1.2 KiB  [emitted]".to_string(),
            ..Default::default()
        })
    }

    pub fn with_errors() -> BuildResult {
        Arc::new(Self {
            errors: true,
            text: "ERROR in ./src/index.js".to_string(),
            ..Default::default()
        })
    }

    pub fn with_warnings() -> BuildResult {
        Arc::new(Self {
            warnings: true,
            text: "WARNING in ./src/index.js".to_string(),
            ..Default::default()
        })
    }
}

impl BuildStats for FakeStats {
    fn has_errors(&self) -> bool {
        self.errors
    }

    fn has_warnings(&self) -> bool {
        self.warnings
    }

    fn render(&self, options: &StatsOptions) -> String {
        match options.preset {
            StatsPreset::None => String::new(),
            _ => self.text.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    runs: AtomicUsize,
    watches: AtomicUsize,
    invalidations: AtomicUsize,
    closes: AtomicUsize,
}

/// A build engine driven by the test.
///
/// `run` fires the `invalid` hook (like a real engine starting a build) and
/// records the call; the test decides when the build finishes by calling
/// [`FakeEngine::fire_done`].
pub struct FakeEngine {
    outputs: BuildOutputs,
    hooks: Mutex<Vec<LifecycleHooks>>,
    fs: Mutex<Option<Arc<dyn VirtualFs>>>,
    counters: Arc<Counters>,
    run_error: Mutex<Option<EngineError>>,
    watch_error: Mutex<Option<EngineError>>,
}

impl FakeEngine {
    pub fn new(outputs: BuildOutputs) -> Arc<Self> {
        Arc::new(Self {
            outputs,
            hooks: Mutex::new(Vec::new()),
            fs: Mutex::new(None),
            counters: Arc::new(Counters::default()),
            run_error: Mutex::new(None),
            watch_error: Mutex::new(None),
        })
    }

    /// Engine with a single target writing to `output_path`.
    pub fn single(output_path: &str) -> Arc<Self> {
        Self::new(BuildOutputs::Single(
            crate::engine::BuildOutputDescriptor::with_output_path(output_path),
        ))
    }

    /// Make every subsequent `run` report `error` through its callback.
    pub fn fail_runs_with(&self, error: EngineError) {
        *self.run_error.lock() = Some(error);
    }

    /// Make the next `watch` report `error` through its callback.
    pub fn fail_watch_with(&self, error: EngineError) {
        *self.watch_error.lock() = Some(error);
    }

    /// Fire the `invalid` hook on every subscriber.
    pub fn fire_invalid(&self) {
        for hooks in self.hooks_snapshot() {
            (hooks.invalid)();
        }
    }

    /// Fire the `done` hook on every subscriber.
    pub fn fire_done(&self, result: BuildResult) {
        for hooks in self.hooks_snapshot() {
            (hooks.done)(Arc::clone(&result));
        }
    }

    pub fn run_count(&self) -> usize {
        self.counters.runs.load(Ordering::SeqCst)
    }

    pub fn watch_count(&self) -> usize {
        self.counters.watches.load(Ordering::SeqCst)
    }

    pub fn invalidate_count(&self) -> usize {
        self.counters.invalidations.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.counters.closes.load(Ordering::SeqCst)
    }

    pub fn subscriber_count(&self) -> usize {
        self.hooks.lock().len()
    }

    /// The filesystem installed by the middleware.
    pub fn file_system(&self) -> Option<Arc<dyn VirtualFs>> {
        self.fs.lock().clone()
    }

    fn hooks_snapshot(&self) -> Vec<LifecycleHooks> {
        self.hooks.lock().clone()
    }
}

impl BuildEngine for FakeEngine {
    fn outputs(&self) -> BuildOutputs {
        self.outputs.clone()
    }

    fn subscribe(&self, hooks: LifecycleHooks) {
        self.hooks.lock().push(hooks);
    }

    fn run(&self, callback: EngineCallback) {
        self.counters.runs.fetch_add(1, Ordering::SeqCst);
        self.fire_invalid();
        let error = self.run_error.lock().clone();
        if let Some(error) = error {
            callback(Err(error));
        }
    }

    fn watch(&self, _options: &WatchOptions, callback: EngineCallback) -> Box<dyn WatchHandle> {
        self.counters.watches.fetch_add(1, Ordering::SeqCst);
        let error = self.watch_error.lock().take();
        if let Some(error) = error {
            callback(Err(error));
        }
        Box::new(FakeWatch {
            counters: Arc::clone(&self.counters),
        })
    }

    fn output_file_system(&self) -> Option<Arc<dyn VirtualFs>> {
        self.fs.lock().clone()
    }

    fn set_output_file_system(&self, fs: Arc<dyn VirtualFs>) {
        *self.fs.lock() = Some(fs);
    }
}

struct FakeWatch {
    counters: Arc<Counters>,
}

impl WatchHandle for FakeWatch {
    fn invalidate(&self) {
        self.counters.invalidations.fetch_add(1, Ordering::SeqCst);
    }

    fn close(&self, done: Box<dyn FnOnce() + Send>) {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        done();
    }
}

/// Which sink a captured line went to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Log,
    Warn,
    Error,
}

/// Records everything written to a set of [`LogSinks`].
#[derive(Debug, Clone, Default)]
pub struct CapturedLogs {
    lines: Arc<Mutex<Vec<(LogLevel, String)>>>,
}

impl CapturedLogs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sinks that append to this capture.
    pub fn sinks(&self) -> LogSinks {
        let log = Arc::clone(&self.lines);
        let warn = Arc::clone(&self.lines);
        let error = Arc::clone(&self.lines);
        LogSinks::new(
            move |line| log.lock().push((LogLevel::Log, line.to_string())),
            move |line| warn.lock().push((LogLevel::Warn, line.to_string())),
            move |line| error.lock().push((LogLevel::Error, line.to_string())),
        )
    }

    pub fn lines(&self, level: LogLevel) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, line)| line.clone())
            .collect()
    }

    pub fn count(&self, level: LogLevel) -> usize {
        self.lines.lock().iter().filter(|(l, _)| *l == level).count()
    }

    pub fn total(&self) -> usize {
        self.lines.lock().len()
    }

    /// Whether any line at `level` contains `needle`.
    pub fn contains(&self, level: LogLevel, needle: &str) -> bool {
        self.lines
            .lock()
            .iter()
            .any(|(l, line)| *l == level && line.contains(needle))
    }
}
