//! Source watching for [`super::CommandEngine`].
//!
//! A notify watcher feeds raw change events into a channel; a tokio task
//! turns bursts of changes into one build each, after the aggregate timeout
//! has passed without further changes.

use notify::{Config, Event, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use settle::{EngineCallback, EngineError, WatchHandle, WatchOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::Inner;

/// Decides which changed paths are worth a rebuild.
#[derive(Debug, Clone)]
pub struct WatchFilter {
    roots: Vec<PathBuf>,
    out_dir: PathBuf,
    ignored: Vec<String>,
}

impl WatchFilter {
    pub fn new(roots: Vec<PathBuf>, out_dir: PathBuf, ignored: Vec<String>) -> Self {
        Self {
            roots,
            out_dir,
            ignored,
        }
    }

    /// Whether a change at `path` should be ignored.
    ///
    /// Ignores the build's own output, anything outside the watched roots,
    /// paths containing one of the `ignored` substrings and hidden files or
    /// directories below a root.
    pub fn should_ignore(&self, path: &Path) -> bool {
        if path.starts_with(&self.out_dir) {
            return true;
        }

        let Some(relative) = self
            .roots
            .iter()
            .find_map(|root| path.strip_prefix(root).ok())
        else {
            return true;
        };

        let path_str = relative.to_string_lossy();
        if self
            .ignored
            .iter()
            .any(|pattern| !pattern.is_empty() && path_str.contains(pattern.as_str()))
        {
            return true;
        }

        relative.components().any(|component| {
            component
                .as_os_str()
                .to_str()
                .is_some_and(|name| name.starts_with('.') && name != "." && name != "..")
        })
    }
}

/// A running watch session.
pub(super) struct CommandWatch {
    trigger: mpsc::UnboundedSender<()>,
    watcher: Mutex<Option<Box<dyn Watcher + Send>>>,
    task: JoinHandle<()>,
}

impl CommandWatch {
    pub(super) fn start(
        inner: Arc<Inner>,
        filter: WatchFilter,
        options: &WatchOptions,
        callback: EngineCallback,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        let watcher = match create_watcher(&filter, options, tx.clone()) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                callback(Err(EngineError::new("failed to watch source directories")
                    .with_details(e.to_string())));
                None
            }
        };

        let aggregate = Duration::from_millis(options.aggregate_timeout_ms);
        let task = inner
            .runtime
            .clone()
            .spawn(watch_loop(inner, rx, aggregate, callback));

        Self {
            trigger: tx,
            watcher: Mutex::new(watcher),
            task,
        }
    }
}

impl WatchHandle for CommandWatch {
    fn invalidate(&self) {
        let _ = self.trigger.send(());
    }

    fn close(&self, done: Box<dyn FnOnce() + Send>) {
        self.watcher.lock().take();
        self.task.abort();
        tracing::debug!("watcher closed");
        done();
    }
}

fn create_watcher(
    filter: &WatchFilter,
    options: &WatchOptions,
    tx: mpsc::UnboundedSender<()>,
) -> notify::Result<Box<dyn Watcher + Send>> {
    let handler_filter = filter.clone();
    let handler = move |res: notify::Result<Event>| {
        let Ok(event) = res else {
            return;
        };
        if !matches!(
            event.kind,
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
        ) {
            return;
        }
        if let Some(path) = event
            .paths
            .iter()
            .find(|path| !handler_filter.should_ignore(path))
        {
            tracing::trace!(path = %path.display(), "source changed");
            let _ = tx.send(());
        }
    };

    let mut watcher: Box<dyn Watcher + Send> = match options.poll_ms {
        Some(poll) => Box::new(PollWatcher::new(
            handler,
            Config::default().with_poll_interval(Duration::from_millis(poll)),
        )?),
        None => Box::new(RecommendedWatcher::new(handler, Config::default())?),
    };

    for root in &filter.roots {
        watcher.watch(root, RecursiveMode::Recursive)?;
        tracing::debug!(root = %root.display(), "watching");
    }
    Ok(watcher)
}

async fn watch_loop(
    inner: Arc<Inner>,
    mut changes: mpsc::UnboundedReceiver<()>,
    aggregate: Duration,
    callback: EngineCallback,
) {
    inner.schedule(Arc::clone(&callback));

    while changes.recv().await.is_some() {
        inner.fire_invalid();
        loop {
            match tokio::time::timeout(aggregate, changes.recv()).await {
                Ok(Some(())) => continue,
                Ok(None) => return,
                Err(_) => break,
            }
        }
        inner.schedule(Arc::clone(&callback));
    }
}
