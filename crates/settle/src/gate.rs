//! The request gate: framework-agnostic middleware entry point.
//!
//! [`DevMiddleware::handle`] decides, per request, whether the request is for
//! a build artifact, waits for the build if needed and produces the response.
//! Framework bindings translate their request type into `(method, url, range)`
//! and map the [`GateOutcome`] back.

use crate::coordinator::Coordinator;
use crate::engine::{BuildEngine, BuildResult};
use crate::error::{ClosedError, SetupError};
use crate::locate::locate;
use crate::mime::MimeRegistry;
use crate::options::{FilenameFilter, IndexPolicy, MiddlewareOptions};
use crate::resolve::resolve;
use crate::respond::Responder;
use crate::vfs::{self, MemoryFs, VirtualFs};
use http::{HeaderName, HeaderValue, Method, Response};
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;

/// What the framework binding should do with a request.
#[derive(Debug)]
pub enum GateOutcome {
    /// Send this response.
    Respond(Response<Vec<u8>>),
    /// Hand the request to the next handler.
    ///
    /// With server-side rendering enabled the build was valid when this was
    /// produced and `result` carries the build result.
    Next { result: Option<BuildResult> },
    /// The middleware was closed while the request waited.
    Unavailable,
}

/// Serves a build engine's output, holding requests while it rebuilds.
pub struct DevMiddleware {
    engine: Arc<dyn BuildEngine>,
    fs: Arc<dyn VirtualFs>,
    coordinator: Arc<Coordinator>,
    responder: Arc<Responder>,
    public_path: String,
    index: IndexPolicy,
    server_side_render: bool,
}

impl fmt::Debug for DevMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DevMiddleware")
            .field("public_path", &self.public_path)
            .field("index", &self.index)
            .field("server_side_render", &self.server_side_render)
            .field("fs", &self.fs)
            .finish_non_exhaustive()
    }
}

impl DevMiddleware {
    /// Install the middleware on `engine`.
    ///
    /// Validates the configuration, gives the engine an in-memory filesystem
    /// if it has none, subscribes to its lifecycle and (outside lazy mode)
    /// starts watching.
    ///
    /// # Errors
    ///
    /// - [`SetupError::RelativeOutputPath`] if any output path is relative
    /// - [`SetupError::InvalidHeader`] for an unusable custom header
    /// - [`SetupError::InvalidFilenamePattern`] if the filename filter does not compile
    /// - [`SetupError::NoRuntime`] outside a tokio runtime
    pub fn new(
        engine: Arc<dyn BuildEngine>,
        mut options: MiddlewareOptions,
    ) -> Result<Arc<Self>, SetupError> {
        let outputs = engine.outputs();
        if let Some(relative) = outputs
            .output_paths()
            .into_iter()
            .find(|path| !vfs::is_absolute(path))
        {
            return Err(SetupError::RelativeOutputPath(relative.to_string()));
        }

        let headers = parse_headers(&options.headers)?;
        let filename = options
            .filename
            .as_ref()
            .map(FilenameFilter::compile)
            .transpose()?;

        if options.stats.context.is_none() {
            options.stats.context = std::env::current_dir().ok();
        }

        let fs = match engine.output_file_system() {
            Some(fs) => fs,
            None => {
                let fs: Arc<dyn VirtualFs> = Arc::new(MemoryFs::new());
                engine.set_output_file_system(Arc::clone(&fs));
                fs
            }
        };

        let coordinator =
            Coordinator::new(Arc::clone(&engine), Arc::clone(&fs), &options, filename)?;

        tracing::debug!(
            public_path = %options.public_path,
            lazy = options.lazy,
            "dev middleware installed"
        );

        Ok(Arc::new(Self {
            engine,
            fs,
            coordinator,
            responder: Arc::new(Responder::new(
                MimeRegistry::with_custom(&options.mime_types),
                headers,
            )),
            public_path: options.public_path,
            index: options.index,
            server_side_render: options.server_side_render,
        }))
    }

    /// Handle one request.
    ///
    /// Only `GET` requests for paths under the public path are served; the
    /// rest pass through. Build artifact requests wait until the build is
    /// valid (content-hashed files excepted).
    pub async fn handle(&self, method: &Method, url: &str, range: Option<&str>) -> GateOutcome {
        if *method != Method::GET {
            return self.pass_through().await;
        }
        let Some(path) = self.artifact_path(url) else {
            return self.pass_through().await;
        };

        // The artifact is read inside the continuation, while the build is
        // still valid; a later rebuild must not leak into this response.
        let (tx, rx) = oneshot::channel();
        let fs = Arc::clone(&self.fs);
        let responder = Arc::clone(&self.responder);
        let index = self.index.clone();
        let range = range.map(str::to_string);
        let artifact = path.clone();
        self.coordinator.handle_request(
            &path,
            Box::new(move |_| {
                let response = locate(&artifact, fs.as_ref(), &index).and_then(|file| {
                    responder.respond(&file, fs.as_ref(), range.as_deref())
                });
                let _ = tx.send(response);
            }),
            Some(url),
        );

        match rx.await {
            Ok(Some(response)) => GateOutcome::Respond(response),
            Ok(None) => {
                tracing::trace!(%path, "no artifact, passing through");
                self.pass_through().await
            }
            Err(_) => GateOutcome::Unavailable,
        }
    }

    async fn pass_through(&self) -> GateOutcome {
        if !self.server_side_render {
            return GateOutcome::Next { result: None };
        }
        match self.until_valid().await {
            Ok(result) => GateOutcome::Next { result },
            Err(ClosedError) => GateOutcome::Unavailable,
        }
    }

    /// Run `callback` once the build is valid.
    pub fn wait_until_valid(&self, callback: impl FnOnce(Option<BuildResult>) + Send + 'static) {
        self.coordinator.wait_until_valid(Box::new(callback));
    }

    /// Invalidate the current build; `callback` runs once it is valid again.
    pub fn invalidate(&self, callback: impl FnOnce(Option<BuildResult>) + Send + 'static) {
        self.coordinator.invalidate(Box::new(callback));
    }

    /// Stop watching and release the engine; `done` runs afterwards.
    pub fn close(&self, done: impl FnOnce() + Send + 'static) {
        self.coordinator.close(Box::new(done));
    }

    /// Wait until the build is valid.
    pub async fn until_valid(&self) -> Result<Option<BuildResult>, ClosedError> {
        let (tx, rx) = oneshot::channel();
        self.wait_until_valid(move |result| {
            let _ = tx.send(result);
        });
        rx.await.map_err(|_| ClosedError)
    }

    /// Invalidate and wait for the resulting build.
    pub async fn invalidated(&self) -> Result<Option<BuildResult>, ClosedError> {
        let (tx, rx) = oneshot::channel();
        self.invalidate(move |result| {
            let _ = tx.send(result);
        });
        rx.await.map_err(|_| ClosedError)
    }

    /// Close and wait for the watcher to shut down.
    pub async fn closed(&self) {
        let (tx, rx) = oneshot::channel();
        self.close(move || {
            let _ = tx.send(());
        });
        let _ = rx.await;
    }

    /// The artifact path a URL resolves to, if it addresses the build output.
    pub fn artifact_path(&self, url: &str) -> Option<String> {
        resolve(&self.public_path, &self.engine.outputs(), url)
    }

    /// The filesystem the engine writes to.
    pub fn file_system(&self) -> Arc<dyn VirtualFs> {
        Arc::clone(&self.fs)
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }
}

fn parse_headers(
    headers: &IndexMap<String, String>,
) -> Result<Vec<(HeaderName, HeaderValue)>, SetupError> {
    headers
        .iter()
        .map(|(name, value)| {
            let invalid = |reason: String| SetupError::InvalidHeader {
                name: name.clone(),
                reason,
            };
            let header_name =
                HeaderName::try_from(name.as_str()).map_err(|e| invalid(e.to_string()))?;
            let header_value =
                HeaderValue::try_from(value.as_str()).map_err(|e| invalid(e.to_string()))?;
            Ok((header_name, header_value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{BuildOutputDescriptor, BuildOutputs};
    use crate::testing::{FakeEngine, FakeStats};
    use crate::report::LogSinks;

    fn quiet_options() -> MiddlewareOptions {
        MiddlewareOptions::default().with_sinks(LogSinks::silent())
    }

    async fn let_tasks_run() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_rejects_relative_output_path() {
        let engine = FakeEngine::single("dist");
        let err = DevMiddleware::new(engine, quiet_options()).unwrap_err();
        assert!(matches!(err, SetupError::RelativeOutputPath(path) if path == "dist"));

        let multi = FakeEngine::new(BuildOutputs::Multi {
            output_path: Some("/root".into()),
            targets: vec![
                BuildOutputDescriptor::new("/js/", "/foo"),
                BuildOutputDescriptor::new("/css/", "bar"),
            ],
        });
        assert!(DevMiddleware::new(multi, quiet_options()).is_err());
    }

    #[tokio::test]
    async fn test_missing_output_path_defaults_to_root() {
        let engine = FakeEngine::new(BuildOutputs::Single(BuildOutputDescriptor::default()));
        assert!(DevMiddleware::new(engine, quiet_options()).is_ok());
    }

    #[tokio::test]
    async fn test_rejects_invalid_header() {
        let engine = FakeEngine::single("/");
        let mut options = quiet_options();
        options
            .headers
            .insert("bad header".to_string(), "x".to_string());
        let err = DevMiddleware::new(engine, options).unwrap_err();
        assert!(matches!(err, SetupError::InvalidHeader { name, .. } if name == "bad header"));
    }

    #[tokio::test]
    async fn test_rejects_invalid_filename_pattern() {
        let engine = FakeEngine::single("/");
        let options = MiddlewareOptions {
            lazy: true,
            filename: Some(FilenameFilter::Pattern {
                pattern: "([".into(),
            }),
            ..quiet_options()
        };
        let err = DevMiddleware::new(engine, options).unwrap_err();
        assert!(matches!(err, SetupError::InvalidFilenamePattern(_)));
    }

    #[tokio::test]
    async fn test_installs_memory_fs_on_engine() {
        let engine = FakeEngine::single("/");
        assert!(engine.file_system().is_none());
        let middleware = DevMiddleware::new(engine.clone(), quiet_options()).unwrap();

        let installed = engine.file_system().unwrap();
        assert!(Arc::ptr_eq(&installed, &middleware.file_system()));
    }

    #[tokio::test]
    async fn test_reuses_engine_fs() {
        let engine = FakeEngine::single("/");
        let fs: Arc<dyn VirtualFs> = Arc::new(MemoryFs::new());
        engine.set_output_file_system(Arc::clone(&fs));
        let middleware = DevMiddleware::new(engine, quiet_options()).unwrap();
        assert!(Arc::ptr_eq(&fs, &middleware.file_system()));
    }

    #[tokio::test]
    async fn test_non_get_passes_through_without_touching_state() {
        let engine = FakeEngine::single("/");
        let middleware = DevMiddleware::new(engine, quiet_options()).unwrap();

        let outcome = middleware.handle(&Method::POST, "/bundle.js", None).await;
        assert!(matches!(outcome, GateOutcome::Next { result: None }));
        assert_eq!(middleware.coordinator().pending_len(), 0);
    }

    #[tokio::test]
    async fn test_get_waits_for_build_then_serves() {
        let engine = FakeEngine::single("/");
        let middleware = DevMiddleware::new(engine.clone(), quiet_options()).unwrap();
        middleware
            .file_system()
            .write_file("/bundle.js", b"console.log('hi')")
            .unwrap();

        let request = {
            let middleware = Arc::clone(&middleware);
            tokio::spawn(async move { middleware.handle(&Method::GET, "/bundle.js", None).await })
        };
        let_tasks_run().await;
        assert_eq!(middleware.coordinator().pending_len(), 1);

        engine.fire_done(FakeStats::clean());
        match request.await.unwrap() {
            GateOutcome::Respond(response) => {
                assert_eq!(response.status(), http::StatusCode::OK);
                assert_eq!(response.body(), b"console.log('hi')");
            }
            other => panic!("expected a response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_serves_content_of_the_build_that_released_it() {
        let engine = FakeEngine::single("/");
        let middleware = DevMiddleware::new(engine.clone(), quiet_options()).unwrap();
        let fs = middleware.file_system();
        fs.write_file("/bundle.js", b"settled").unwrap();

        let mut request = std::pin::pin!(middleware.handle(&Method::GET, "/bundle.js", None));
        std::future::poll_fn(|cx| {
            assert!(request.as_mut().poll(cx).is_pending());
            std::task::Poll::Ready(())
        })
        .await;
        assert_eq!(middleware.coordinator().pending_len(), 1);

        engine.fire_done(FakeStats::clean());
        while middleware.coordinator().pending_len() > 0 {
            tokio::task::yield_now().await;
        }

        // A new build starts and rewrites the file before the request resumes.
        engine.fire_invalid();
        fs.write_file("/bundle.js", b"half-written").unwrap();
        assert!(!middleware.coordinator().is_valid());

        match request.await {
            GateOutcome::Respond(response) => assert_eq!(response.body(), b"settled"),
            other => panic!("expected a response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_artifact_passes_through() {
        let engine = FakeEngine::single("/");
        let middleware = DevMiddleware::new(engine.clone(), quiet_options()).unwrap();
        engine.fire_done(FakeStats::clean());

        let outcome = middleware.handle(&Method::GET, "/missing.js", None).await;
        assert!(matches!(outcome, GateOutcome::Next { result: None }));
    }

    #[tokio::test]
    async fn test_server_side_render_defers_next() {
        let engine = FakeEngine::single("/");
        let options = MiddlewareOptions {
            server_side_render: true,
            ..quiet_options()
        };
        let middleware = DevMiddleware::new(engine.clone(), options).unwrap();

        let request = {
            let middleware = Arc::clone(&middleware);
            tokio::spawn(async move { middleware.handle(&Method::POST, "/api", None).await })
        };
        let_tasks_run().await;
        assert!(!request.is_finished());

        let result = FakeStats::clean();
        engine.fire_done(result.clone());
        match request.await.unwrap() {
            GateOutcome::Next {
                result: Some(received),
            } => assert!(Arc::ptr_eq(&received, &result)),
            other => panic!("expected next with a result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_close_releases_waiters_as_unavailable() {
        let engine = FakeEngine::single("/");
        let middleware = DevMiddleware::new(engine.clone(), quiet_options()).unwrap();

        let request = {
            let middleware = Arc::clone(&middleware);
            tokio::spawn(async move { middleware.handle(&Method::GET, "/bundle.js", None).await })
        };
        let_tasks_run().await;

        middleware.closed().await;
        assert!(matches!(request.await.unwrap(), GateOutcome::Unavailable));
        assert_eq!(engine.close_count(), 1);
        assert_eq!(middleware.until_valid().await.unwrap_err(), ClosedError);
    }

    #[tokio::test]
    async fn test_invalidated_resolves_after_rebuild() {
        let engine = FakeEngine::single("/");
        let middleware = DevMiddleware::new(engine.clone(), quiet_options()).unwrap();
        engine.fire_done(FakeStats::clean());
        let_tasks_run().await;

        let waiter = {
            let middleware = Arc::clone(&middleware);
            tokio::spawn(async move { middleware.invalidated().await })
        };
        let_tasks_run().await;
        assert_eq!(engine.invalidate_count(), 1);

        engine.fire_invalid();
        engine.fire_done(FakeStats::with_warnings());
        let result = waiter.await.unwrap().unwrap().unwrap();
        assert!(result.has_warnings());
    }

    #[tokio::test]
    async fn test_artifact_path() {
        let engine = FakeEngine::single("/dist");
        let options = MiddlewareOptions {
            public_path: "/assets/".into(),
            ..quiet_options()
        };
        let middleware = DevMiddleware::new(engine, options).unwrap();
        assert_eq!(
            middleware.artifact_path("/assets/app.js"),
            Some("/dist/app.js".to_string())
        );
        assert_eq!(middleware.artifact_path("/other/app.js"), None);
    }
}
