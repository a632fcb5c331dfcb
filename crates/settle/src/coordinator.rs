//! Build-state coordination.
//!
//! The [`Coordinator`] is the single owner of build validity. It subscribes to
//! the engine's lifecycle hooks, parks continuations while a build is in
//! flight and releases them, in order, once the build settles.
//!
//! # Completion phases
//!
//! A finished build is handled in two phases:
//!
//! 1. **Completion** (inside the engine's `done` hook): mark the state valid,
//!    store the result and issue a pending forced rebuild.
//! 2. **Drain** (a tokio task scheduled behind the completion): re-check
//!    validity, report, then run every queued continuation with the result.
//!
//! Splitting the phases lets an engine invalidate again synchronously from its
//! own `done` handling without releasing requests against stale output.
//!
//! # Locking
//!
//! State lives behind one `parking_lot::Mutex` that is only held while fields
//! are read or written. Continuations, reporter output and engine calls all run
//! after the guard is dropped.

use crate::engine::{
    BuildEngine, BuildResult, EngineCallback, EngineError, LifecycleHooks, WatchHandle,
};
use crate::error::SetupError;
use crate::options::{MiddlewareOptions, StatsOptions};
use crate::report::{DefaultReporter, LogSinks, ReportArgs, Reporter, ReporterOptions};
use crate::vfs::VirtualFs;
use parking_lot::Mutex;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tokio::runtime::Handle;

/// Long lowercase hex runs mark content-hashed, immutable file names.
static HASHED_FILENAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[0-9a-f]{10,}").expect("hash pattern is valid"));

/// Deferred work resumed once the build is valid.
///
/// Receives the most recent build result, if any build has completed.
pub type Continuation = Box<dyn FnOnce(Option<BuildResult>) + Send>;

struct CoordinatorState {
    valid: bool,
    pending: Vec<Continuation>,
    force_rebuild: bool,
    last_result: Option<BuildResult>,
    watch: Option<Arc<dyn WatchHandle>>,
    closed: bool,
}

/// Tracks build validity and gates continuations on it.
pub struct Coordinator {
    engine: Arc<dyn BuildEngine>,
    fs: Arc<dyn VirtualFs>,
    lazy: bool,
    filename: Option<Regex>,
    reporter: Arc<dyn Reporter>,
    reporter_options: ReporterOptions,
    stats: StatsOptions,
    sinks: LogSinks,
    runtime: Handle,
    state: Mutex<CoordinatorState>,
}

impl Coordinator {
    /// Install a coordinator on `engine`.
    ///
    /// Subscribes to the engine's lifecycle hooks and, unless `options.lazy`
    /// is set, starts the engine's watcher. In lazy mode the state starts
    /// valid so no request waits for a build nobody triggered.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::NoRuntime`] when called outside a tokio runtime.
    pub fn new(
        engine: Arc<dyn BuildEngine>,
        fs: Arc<dyn VirtualFs>,
        options: &MiddlewareOptions,
        filename: Option<Regex>,
    ) -> Result<Arc<Self>, SetupError> {
        let runtime = Handle::try_current().map_err(|_| SetupError::NoRuntime)?;

        let coordinator = Arc::new(Self {
            engine,
            fs,
            lazy: options.lazy,
            filename,
            reporter: options
                .reporter
                .clone()
                .unwrap_or_else(|| Arc::new(DefaultReporter)),
            reporter_options: ReporterOptions {
                report_time: options.report_time,
                no_info: options.no_info,
                quiet: options.quiet,
            },
            stats: options.stats.clone(),
            sinks: options.sinks.clone(),
            runtime,
            state: Mutex::new(CoordinatorState {
                valid: options.lazy,
                pending: Vec::new(),
                force_rebuild: false,
                last_result: None,
                watch: None,
                closed: false,
            }),
        });

        let on_invalid = Arc::downgrade(&coordinator);
        let on_done = Arc::downgrade(&coordinator);
        coordinator.engine.subscribe(LifecycleHooks::new(
            move || {
                if let Some(coordinator) = on_invalid.upgrade() {
                    coordinator.on_invalid();
                }
            },
            move |result| {
                if let Some(coordinator) = on_done.upgrade() {
                    coordinator.on_done(result);
                }
            },
        ));

        if !options.lazy {
            tracing::debug!(
                aggregate_timeout_ms = options.watch_options.aggregate_timeout_ms,
                "starting build watcher"
            );
            let handle = coordinator
                .engine
                .watch(&options.watch_options, coordinator.engine_callback());
            coordinator.state.lock().watch = Some(Arc::from(handle));
        }

        Ok(coordinator)
    }

    /// Run `continuation` now if the build is valid, otherwise queue it.
    ///
    /// `request` names the waiting request in the "wait until bundle
    /// finished" notice. After [`Coordinator::close`] the continuation is
    /// dropped without running.
    pub fn ready(&self, continuation: Continuation, request: Option<&str>) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        if state.valid {
            let result = state.last_result.clone();
            drop(state);
            continuation(result);
            return;
        }
        state.pending.push(continuation);
        drop(state);

        if !self.reporter_options.no_info && !self.reporter_options.quiet {
            self.sinks.log(&format!(
                "settle: wait until bundle finished: {}",
                request.unwrap_or("callback")
            ));
        }
    }

    /// Start a single-shot build, or request one more if a build is running.
    ///
    /// Never starts overlapping builds: any number of calls during a build
    /// collapse into exactly one follow-up build.
    pub fn rebuild(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        if state.valid {
            state.valid = false;
            drop(state);
            tracing::debug!("starting build");
            self.engine.run(self.engine_callback());
        } else {
            state.force_rebuild = true;
        }
    }

    /// Gate a request for the artifact at `path`.
    ///
    /// In lazy mode a build is triggered first when `path` passes the
    /// filename filter. Existing content-hashed files are served at once.
    pub fn handle_request(&self, path: &str, continuation: Continuation, request: Option<&str>) {
        if self.lazy && self.filename.as_ref().is_none_or(|filter| filter.is_match(path)) {
            self.rebuild();
        }

        if HASHED_FILENAME.is_match(path) && self.fs.stat(path).is_ok_and(|stat| stat.is_file()) {
            let result = {
                let state = self.state.lock();
                if state.closed {
                    return;
                }
                state.last_result.clone()
            };
            tracing::trace!(path, "serving hashed file without waiting");
            continuation(result);
            return;
        }

        self.ready(continuation, request);
    }

    /// Run `callback` once the build is valid.
    pub fn wait_until_valid(&self, callback: Continuation) {
        self.ready(callback, None);
    }

    /// Invalidate the current build.
    ///
    /// With an active watcher, the state turns invalid right away and
    /// `callback` runs after the rebuild the watcher performs. Without one
    /// (lazy mode) it runs immediately.
    pub fn invalidate(&self, callback: Continuation) {
        let (watch, result) = {
            let state = self.state.lock();
            if state.closed {
                return;
            }
            (state.watch.clone(), state.last_result.clone())
        };

        match watch {
            Some(watch) => {
                self.on_invalid();
                self.ready(callback, None);
                watch.invalidate();
            }
            None => callback(result),
        }
    }

    /// Stop the coordinator.
    ///
    /// Queued continuations are dropped, lifecycle events are ignored from
    /// now on, and the watcher (if any) is closed before `done` runs.
    pub fn close(&self, done: Box<dyn FnOnce() + Send>) {
        let (watch, abandoned) = {
            let mut state = self.state.lock();
            if state.closed {
                drop(state);
                done();
                return;
            }
            state.closed = true;
            (state.watch.take(), std::mem::take(&mut state.pending))
        };

        tracing::debug!(abandoned = abandoned.len(), "closing coordinator");
        drop(abandoned);

        match watch {
            Some(watch) => watch.close(done),
            None => done(),
        }
    }

    /// Whether the last build is current.
    pub fn is_valid(&self) -> bool {
        self.state.lock().valid
    }

    /// Whether [`Coordinator::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of continuations waiting for the build.
    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Whether a rebuild was requested while a build was running.
    pub fn force_rebuild_requested(&self) -> bool {
        self.state.lock().force_rebuild
    }

    /// The result of the most recent completed build.
    pub fn last_result(&self) -> Option<BuildResult> {
        self.state.lock().last_result.clone()
    }

    fn on_invalid(&self) {
        let was_valid = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            std::mem::replace(&mut state.valid, false)
        };

        if was_valid && !self.reporter_options.no_info && !self.reporter_options.quiet {
            self.report(false, None);
        }
    }

    fn on_done(self: &Arc<Self>, result: BuildResult) {
        let forced = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.valid = true;
            state.last_result = Some(result);
            std::mem::take(&mut state.force_rebuild)
        };

        if forced {
            tracing::debug!("build requested while building, rebuilding");
            self.rebuild();
        }

        let coordinator = Arc::clone(self);
        self.runtime.spawn(async move {
            tokio::task::yield_now().await;
            coordinator.drain();
        });
    }

    fn drain(&self) {
        let (result, pending) = {
            let mut state = self.state.lock();
            if state.closed || !state.valid {
                return;
            }
            (state.last_result.clone(), std::mem::take(&mut state.pending))
        };

        self.report(true, result.as_ref());

        tracing::trace!(count = pending.len(), "releasing queued requests");
        for continuation in pending {
            continuation(result.clone());
        }
    }

    fn report(&self, state: bool, result: Option<&BuildResult>) {
        self.reporter.report(&ReportArgs {
            state,
            result,
            options: self.reporter_options,
            stats: &self.stats,
            sinks: &self.sinks,
        });
    }

    fn engine_callback(&self) -> EngineCallback {
        let sinks = self.sinks.clone();
        Arc::new(move |outcome| {
            if let Err(error) = outcome {
                report_engine_error(&sinks, &error);
            }
        })
    }
}

fn report_engine_error(sinks: &LogSinks, error: &EngineError) {
    sinks.error(error.stack.as_deref().unwrap_or(&error.message));
    if let Some(details) = &error.details {
        sinks.error(details);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CapturedLogs, FakeEngine, FakeStats, LogLevel};
    use crate::vfs::MemoryFs;

    fn options(lazy: bool, logs: &CapturedLogs) -> MiddlewareOptions {
        MiddlewareOptions {
            lazy,
            ..Default::default()
        }
        .with_sinks(logs.sinks())
    }

    fn install(
        engine: &Arc<FakeEngine>,
        lazy: bool,
        logs: &CapturedLogs,
    ) -> (Arc<Coordinator>, Arc<MemoryFs>) {
        let fs = Arc::new(MemoryFs::new());
        let coordinator =
            Coordinator::new(engine.clone(), fs.clone(), &options(lazy, logs), None).unwrap();
        (coordinator, fs)
    }

    async fn until(condition: impl Fn() -> bool) {
        for _ in 0..100 {
            if condition() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("condition not reached");
    }

    async fn let_tasks_run() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    type Calls = Arc<Mutex<Vec<(usize, Option<BuildResult>)>>>;

    fn recorder(calls: &Calls, id: usize) -> Continuation {
        let calls = Arc::clone(calls);
        Box::new(move |result| calls.lock().push((id, result)))
    }

    #[test]
    fn test_requires_runtime() {
        let engine = FakeEngine::single("/");
        let result = Coordinator::new(
            engine,
            Arc::new(MemoryFs::new()),
            &MiddlewareOptions::default(),
            None,
        );
        assert!(matches!(result, Err(SetupError::NoRuntime)));
    }

    #[tokio::test]
    async fn test_initial_state() {
        let logs = CapturedLogs::new();

        let watching = FakeEngine::single("/");
        let (coordinator, _) = install(&watching, false, &logs);
        assert!(!coordinator.is_valid());
        assert_eq!(watching.watch_count(), 1);
        assert_eq!(watching.subscriber_count(), 1);

        let lazy = FakeEngine::single("/");
        let (coordinator, _) = install(&lazy, true, &logs);
        assert!(coordinator.is_valid());
        assert_eq!(lazy.watch_count(), 0);
        assert_eq!(lazy.run_count(), 0);
    }

    #[tokio::test]
    async fn test_queued_continuations_drain_in_order() {
        let logs = CapturedLogs::new();
        let engine = FakeEngine::single("/");
        let (coordinator, _) = install(&engine, false, &logs);
        let calls: Calls = Arc::default();

        for id in 0..3 {
            coordinator.ready(recorder(&calls, id), Some("/bundle.js"));
        }
        assert_eq!(coordinator.pending_len(), 3);
        assert!(calls.lock().is_empty());
        assert_eq!(
            logs.lines(LogLevel::Log),
            vec!["settle: wait until bundle finished: /bundle.js".to_string(); 3]
        );

        let result = FakeStats::clean();
        engine.fire_done(result.clone());
        assert!(coordinator.is_valid());

        until(|| calls.lock().len() == 3).await;
        let calls = calls.lock();
        assert_eq!(calls.iter().map(|(id, _)| *id).collect::<Vec<_>>(), vec![0, 1, 2]);
        for (_, received) in calls.iter() {
            assert!(Arc::ptr_eq(received.as_ref().unwrap(), &result));
        }
        assert_eq!(coordinator.pending_len(), 0);
        assert!(logs.contains(LogLevel::Log, "settle: Compiled successfully."));
    }

    #[tokio::test]
    async fn test_ready_runs_immediately_when_valid() {
        let logs = CapturedLogs::new();
        let engine = FakeEngine::single("/");
        let (coordinator, _) = install(&engine, false, &logs);
        let result = FakeStats::with_warnings();
        engine.fire_done(result.clone());

        let calls: Calls = Arc::default();
        coordinator.ready(recorder(&calls, 7), None);
        let calls = calls.lock();
        assert_eq!(calls.len(), 1);
        assert!(Arc::ptr_eq(calls[0].1.as_ref().unwrap(), &result));
    }

    #[tokio::test]
    async fn test_invalidation_before_drain_keeps_requests_waiting() {
        let logs = CapturedLogs::new();
        let engine = FakeEngine::single("/");
        let (coordinator, _) = install(&engine, false, &logs);
        let calls: Calls = Arc::default();
        coordinator.ready(recorder(&calls, 0), None);

        engine.fire_done(FakeStats::clean());
        engine.fire_invalid();
        let_tasks_run().await;

        assert!(calls.lock().is_empty());
        assert_eq!(coordinator.pending_len(), 1);
        assert!(!logs.contains(LogLevel::Log, "Compiled successfully."));
        assert_eq!(
            logs.lines(LogLevel::Log).last().map(String::as_str),
            Some("settle: Compiling...")
        );

        engine.fire_done(FakeStats::clean());
        until(|| calls.lock().len() == 1).await;
    }

    #[tokio::test]
    async fn test_compiling_reported_once_per_transition() {
        let logs = CapturedLogs::new();
        let engine = FakeEngine::single("/");
        let (_coordinator, _) = install(&engine, false, &logs);

        engine.fire_invalid();
        assert_eq!(logs.total(), 0);

        engine.fire_done(FakeStats::clean());
        let_tasks_run().await;
        engine.fire_invalid();
        engine.fire_invalid();

        let compiling = logs
            .lines(LogLevel::Log)
            .into_iter()
            .filter(|line| line == "settle: Compiling...")
            .count();
        assert_eq!(compiling, 1);
    }

    #[tokio::test]
    async fn test_rebuild_while_building_runs_exactly_once_more() {
        let logs = CapturedLogs::new();
        let engine = FakeEngine::single("/");
        let (coordinator, _) = install(&engine, true, &logs);

        coordinator.rebuild();
        assert_eq!(engine.run_count(), 1);
        assert!(!coordinator.is_valid());

        coordinator.rebuild();
        coordinator.rebuild();
        assert_eq!(engine.run_count(), 1);
        assert!(coordinator.force_rebuild_requested());

        engine.fire_done(FakeStats::clean());
        assert_eq!(engine.run_count(), 2);
        assert!(!coordinator.force_rebuild_requested());
        assert!(!coordinator.is_valid());

        engine.fire_done(FakeStats::clean());
        let_tasks_run().await;
        assert_eq!(engine.run_count(), 2);
        assert!(coordinator.is_valid());
    }

    #[tokio::test]
    async fn test_forced_rebuild_holds_requests_for_the_newer_build() {
        let logs = CapturedLogs::new();
        let engine = FakeEngine::single("/");
        let (coordinator, _) = install(&engine, true, &logs);
        let calls: Calls = Arc::default();

        coordinator.handle_request("/bundle.js", recorder(&calls, 0), None);
        coordinator.handle_request("/bundle.js", recorder(&calls, 1), None);
        assert_eq!(coordinator.pending_len(), 2);

        let first = FakeStats::clean();
        engine.fire_done(first.clone());
        let_tasks_run().await;
        assert!(calls.lock().is_empty());

        let second = FakeStats::clean();
        engine.fire_done(second.clone());
        until(|| calls.lock().len() == 2).await;
        for (_, received) in calls.lock().iter() {
            assert!(Arc::ptr_eq(received.as_ref().unwrap(), &second));
        }
    }

    #[tokio::test]
    async fn test_lazy_filename_filter() {
        let logs = CapturedLogs::new();
        let engine = FakeEngine::single("/");
        let fs = Arc::new(MemoryFs::new());
        let filter = crate::options::FilenameFilter::Name("bundle.js".into())
            .compile()
            .unwrap();
        let coordinator =
            Coordinator::new(engine.clone(), fs, &options(true, &logs), Some(filter)).unwrap();

        let calls: Calls = Arc::default();
        coordinator.handle_request("/other.js", recorder(&calls, 0), None);
        assert_eq!(engine.run_count(), 0);
        assert_eq!(calls.lock().len(), 1);

        coordinator.handle_request("/bundle.js", recorder(&calls, 1), None);
        assert_eq!(engine.run_count(), 1);
        assert_eq!(coordinator.pending_len(), 1);
    }

    #[tokio::test]
    async fn test_hashed_file_bypasses_the_queue() {
        let logs = CapturedLogs::new();
        let engine = FakeEngine::single("/");
        let (coordinator, fs) = install(&engine, false, &logs);
        fs.write_file("/0.19dc5d417382d73dd190.hot-update.js", b"update")
            .unwrap();

        let calls: Calls = Arc::default();
        coordinator.handle_request("/0.19dc5d417382d73dd190.hot-update.js", recorder(&calls, 0), None);
        assert_eq!(calls.lock().len(), 1);

        coordinator.handle_request("/0.aaaaaaaaaabbbbbbbbbb.missing.js", recorder(&calls, 1), None);
        coordinator.handle_request("/bundle.js", recorder(&calls, 2), None);
        assert_eq!(calls.lock().len(), 1);
        assert_eq!(coordinator.pending_len(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_without_watcher_is_immediate() {
        let logs = CapturedLogs::new();
        let engine = FakeEngine::single("/");
        let (coordinator, _) = install(&engine, true, &logs);

        let calls: Calls = Arc::default();
        coordinator.invalidate(recorder(&calls, 0));
        assert_eq!(calls.lock().len(), 1);
        assert_eq!(engine.invalidate_count(), 0);
    }

    #[tokio::test]
    async fn test_invalidate_with_watcher_waits_for_build() {
        let logs = CapturedLogs::new();
        let engine = FakeEngine::single("/");
        let (coordinator, _) = install(&engine, false, &logs);
        engine.fire_done(FakeStats::clean());
        let_tasks_run().await;

        let calls: Calls = Arc::default();
        coordinator.invalidate(recorder(&calls, 0));
        assert_eq!(engine.invalidate_count(), 1);
        assert!(!coordinator.is_valid());
        assert!(calls.lock().is_empty());
        assert!(logs.contains(LogLevel::Log, "settle: Compiling..."));

        engine.fire_done(FakeStats::clean());
        until(|| calls.lock().len() == 1).await;
        assert_eq!(engine.invalidate_count(), 1);
    }

    #[tokio::test]
    async fn test_close_abandons_waiters_and_ignores_events() {
        let logs = CapturedLogs::new();
        let engine = FakeEngine::single("/");
        let (coordinator, _) = install(&engine, false, &logs);
        let calls: Calls = Arc::default();
        coordinator.ready(recorder(&calls, 0), None);

        let closed = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&closed);
        coordinator.close(Box::new(move || *flag.lock() = true));

        assert!(*closed.lock());
        assert!(coordinator.is_closed());
        assert_eq!(engine.close_count(), 1);
        assert_eq!(coordinator.pending_len(), 0);

        engine.fire_done(FakeStats::clean());
        let_tasks_run().await;
        assert!(!coordinator.is_valid());
        assert!(calls.lock().is_empty());

        coordinator.ready(recorder(&calls, 1), None);
        assert!(calls.lock().is_empty());
        assert_eq!(coordinator.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_close_without_watcher_calls_back() {
        let logs = CapturedLogs::new();
        let engine = FakeEngine::single("/");
        let (coordinator, _) = install(&engine, true, &logs);

        let count = Arc::new(Mutex::new(0));
        for _ in 0..2 {
            let count = Arc::clone(&count);
            coordinator.close(Box::new(move || *count.lock() += 1));
        }
        assert_eq!(*count.lock(), 2);
        assert_eq!(engine.close_count(), 0);
    }

    #[tokio::test]
    async fn test_engine_errors_go_to_error_sink() {
        let logs = CapturedLogs::new();
        let engine = FakeEngine::single("/");
        engine.fail_runs_with(
            EngineError::new("boom")
                .with_stack("Error: boom\n    at compile")
                .with_details("entry module not found"),
        );
        let (coordinator, _) = install(&engine, true, &logs);

        coordinator.rebuild();
        assert_eq!(
            logs.lines(LogLevel::Error),
            vec![
                "Error: boom\n    at compile".to_string(),
                "entry module not found".to_string()
            ]
        );
        assert!(!coordinator.is_closed());
    }

    #[tokio::test]
    async fn test_watch_error_without_stack_reports_message() {
        let logs = CapturedLogs::new();
        let engine = FakeEngine::single("/");
        engine.fail_watch_with(EngineError::new("watch failed"));
        let (_coordinator, _) = install(&engine, false, &logs);

        assert_eq!(logs.lines(LogLevel::Error), vec!["watch failed".to_string()]);
    }

    #[tokio::test]
    async fn test_no_info_suppresses_wait_notice() {
        let logs = CapturedLogs::new();
        let engine = FakeEngine::single("/");
        let options = MiddlewareOptions {
            no_info: true,
            ..Default::default()
        }
        .with_sinks(logs.sinks());
        let coordinator =
            Coordinator::new(engine.clone(), Arc::new(MemoryFs::new()), &options, None).unwrap();

        coordinator.ready(Box::new(|_| {}), Some("/bundle.js"));
        assert_eq!(logs.total(), 0);
    }

    #[tokio::test]
    async fn test_custom_reporter_is_used() {
        struct Counting(Arc<Mutex<Vec<bool>>>);
        impl Reporter for Counting {
            fn report(&self, args: &ReportArgs<'_>) {
                self.0.lock().push(args.state);
            }
        }

        let states = Arc::new(Mutex::new(Vec::new()));
        let engine = FakeEngine::single("/");
        let options = MiddlewareOptions::default()
            .with_sinks(LogSinks::silent())
            .with_reporter(Arc::new(Counting(Arc::clone(&states))));
        let _coordinator =
            Coordinator::new(engine.clone(), Arc::new(MemoryFs::new()), &options, None).unwrap();

        engine.fire_done(FakeStats::clean());
        let_tasks_run().await;
        engine.fire_invalid();
        assert_eq!(*states.lock(), vec![true, false]);
    }
}
