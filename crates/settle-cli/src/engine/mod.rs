//! A [`BuildEngine`] that runs an external build command.
//!
//! Each build runs the command through the platform shell, then mirrors the
//! output directory into the middleware's in-memory filesystem. The
//! lifecycle hooks fire `invalid` when a build starts and `done` with a
//! [`CommandStats`] when it finishes. Builds never overlap: a request for a
//! build while one is running is remembered and runs once the current one
//! is done.

mod mirror;
mod stats;
mod watch;

pub use mirror::{MAX_FILE_SIZE, MirrorError, Mirrored, mirror};
pub use stats::CommandStats;
pub use watch::WatchFilter;

use crate::error::{CliError, Result};
use parking_lot::Mutex;
use settle::{
    BuildEngine, BuildOutputDescriptor, BuildOutputs, BuildResult, EngineCallback, EngineError,
    LifecycleHooks, VirtualFs, WatchHandle, WatchOptions, vfs,
};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;
use tokio::process::Command;
use tokio::runtime::Handle;

/// What the build command is and where it reads and writes.
#[derive(Debug, Clone)]
pub struct BuildCommand {
    /// Shell line to run
    pub command: String,
    /// Working directory of the command
    pub cwd: PathBuf,
    /// Absolute directory the command writes its output to
    pub out_dir: PathBuf,
    /// Absolute directories whose changes trigger a rebuild
    pub watch: Vec<PathBuf>,
}

#[derive(Default)]
struct RunState {
    running: bool,
    queued: Option<EngineCallback>,
}

struct Inner {
    build: BuildCommand,
    output_path: String,
    hooks: Mutex<Vec<LifecycleHooks>>,
    fs: Mutex<Option<Arc<dyn VirtualFs>>>,
    runs: Mutex<RunState>,
    runtime: Handle,
}

/// Build engine backed by a shell command.
pub struct CommandEngine {
    inner: Arc<Inner>,
}

impl CommandEngine {
    /// Create an engine running `build`.
    ///
    /// Must be called inside a tokio runtime; builds run on it.
    pub fn new(build: BuildCommand) -> Result<Arc<Self>> {
        let runtime = Handle::try_current()
            .map_err(|e| CliError::Server(format!("no tokio runtime for builds: {e}")))?;
        let output_path = vfs::normalize(&build.out_dir.to_string_lossy()).map_err(|_| {
            CliError::InvalidArgument(format!(
                "output directory must be absolute: {}",
                build.out_dir.display()
            ))
        })?;

        Ok(Arc::new(Self {
            inner: Arc::new(Inner {
                build,
                output_path,
                hooks: Mutex::new(Vec::new()),
                fs: Mutex::new(None),
                runs: Mutex::new(RunState::default()),
                runtime,
            }),
        }))
    }

    /// The virtual path the output directory is mirrored to.
    pub fn output_path(&self) -> &str {
        &self.inner.output_path
    }
}

impl BuildEngine for CommandEngine {
    fn outputs(&self) -> BuildOutputs {
        BuildOutputs::Single(BuildOutputDescriptor::with_output_path(
            self.inner.output_path.clone(),
        ))
    }

    fn subscribe(&self, hooks: LifecycleHooks) {
        self.inner.hooks.lock().push(hooks);
    }

    fn run(&self, callback: EngineCallback) {
        self.inner.schedule(callback);
    }

    fn watch(&self, options: &WatchOptions, callback: EngineCallback) -> Box<dyn WatchHandle> {
        let filter = WatchFilter::new(
            self.inner.build.watch.clone(),
            self.inner.build.out_dir.clone(),
            options.ignored.clone(),
        );
        Box::new(watch::CommandWatch::start(
            Arc::clone(&self.inner),
            filter,
            options,
            callback,
        ))
    }

    fn output_file_system(&self) -> Option<Arc<dyn VirtualFs>> {
        self.inner.fs.lock().clone()
    }

    fn set_output_file_system(&self, fs: Arc<dyn VirtualFs>) {
        *self.inner.fs.lock() = Some(fs);
    }
}

impl Inner {
    /// Start a build now, or after the running one.
    ///
    /// Only the latest request made during a build is kept.
    fn schedule(self: &Arc<Self>, callback: EngineCallback) {
        {
            let mut runs = self.runs.lock();
            if runs.running {
                runs.queued = Some(callback);
                return;
            }
            runs.running = true;
        }

        let inner = Arc::clone(self);
        self.runtime.spawn(async move {
            let mut callback = callback;
            loop {
                inner.run_build(&callback).await;
                let next = {
                    let mut runs = inner.runs.lock();
                    match runs.queued.take() {
                        Some(next) => next,
                        None => {
                            runs.running = false;
                            return;
                        }
                    }
                };
                callback = next;
            }
        });
    }

    fn fire_invalid(&self) {
        let hooks = self.hooks.lock().clone();
        for hook in hooks {
            (hook.invalid)();
        }
    }

    fn fire_done(&self, result: BuildResult) {
        let hooks = self.hooks.lock().clone();
        for hook in hooks {
            (hook.done)(Arc::clone(&result));
        }
    }

    async fn run_build(&self, callback: &EngineCallback) {
        self.fire_invalid();
        tracing::info!(command = %self.build.command, "building");

        let started = Instant::now();
        let output = match shell(&self.build.command)
            .current_dir(&self.build.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                callback(Err(EngineError::new(format!(
                    "failed to start `{}`",
                    self.build.command
                ))
                .with_details(e.to_string())));
                return;
            }
        };

        let mut stats = CommandStats {
            command: self.build.command.clone(),
            exit_code: output.status.code(),
            success: output.status.success(),
            duration: started.elapsed(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            ..Default::default()
        };

        if stats.success {
            self.mirror_output(&mut stats).await;
        }
        tracing::debug!(
            success = stats.success,
            files = stats.emitted,
            elapsed_ms = stats.duration.as_millis() as u64,
            "build finished"
        );

        self.fire_done(Arc::new(stats));
        callback(Ok(()));
    }

    async fn mirror_output(&self, stats: &mut CommandStats) {
        let Some(fs) = self.fs.lock().clone() else {
            stats.mirror_error = Some("no output filesystem installed".to_string());
            return;
        };

        let out_dir = self.build.out_dir.clone();
        let output_path = self.output_path.clone();
        let mirrored =
            tokio::task::spawn_blocking(move || mirror(&out_dir, fs.as_ref(), &output_path)).await;

        match mirrored {
            Ok(Ok(mirrored)) => {
                stats.emitted = mirrored.files;
                stats.skipped = mirrored.skipped;
            }
            Ok(Err(e)) => stats.mirror_error = Some(e.to_string()),
            Err(e) => stats.mirror_error = Some(format!("mirroring output failed: {e}")),
        }
    }
}

#[cfg(unix)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}
