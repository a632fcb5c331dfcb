//! axum binding for the settle dev middleware.
//!
//! Mount a [`DevMiddleware`] in front of a router so build artifacts are served
//! from the engine's in-memory output and everything else falls through to the
//! router's own routes and fallback.
//!
//! # Example
//!
//! ```rust,no_run
//! use axum::Router;
//! use settle::{BuildEngine, DevMiddleware, MiddlewareOptions};
//! use settle_axum::RouterExt;
//! use std::sync::Arc;
//!
//! # fn example(engine: Arc<dyn BuildEngine>) -> Result<(), settle::SetupError> {
//! let middleware = DevMiddleware::new(engine, MiddlewareOptions::default())?;
//! let app: Router = Router::new().settle(middleware);
//! # Ok(())
//! # }
//! ```
//!
//! With `serverSideRender` enabled, downstream handlers receive the settled
//! build as an `Extension<BuildResult>`.

use axum::{
    Router,
    body::Body,
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::{Next, from_fn_with_state},
    response::{IntoResponse, Response},
};
use settle::{DevMiddleware, GateOutcome};
use std::sync::Arc;

pub use settle::BuildResult;

/// Middleware function for [`axum::middleware::from_fn_with_state`].
///
/// A middleware closed while the request waited answers
/// `503 Service Unavailable`.
pub async fn serve(
    State(middleware): State<Arc<DevMiddleware>>,
    mut request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let url = request.uri().to_string();
    let range = request
        .headers()
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    match middleware.handle(&method, &url, range.as_deref()).await {
        GateOutcome::Respond(response) => response.map(Body::from),
        GateOutcome::Next { result } => {
            if let Some(result) = result {
                request.extensions_mut().insert(result);
            }
            next.run(request).await
        }
        GateOutcome::Unavailable => {
            tracing::debug!(%url, "dev middleware closed while request waited");
            (StatusCode::SERVICE_UNAVAILABLE, "dev middleware closed").into_response()
        }
    }
}

/// Mount a [`DevMiddleware`] on a router.
pub trait RouterExt {
    /// Route every request through `middleware` before the router's own
    /// routes and fallback.
    fn settle(self, middleware: Arc<DevMiddleware>) -> Self;
}

impl<S> RouterExt for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn settle(self, middleware: Arc<DevMiddleware>) -> Self {
        self.layer(from_fn_with_state(middleware, serve))
    }
}
