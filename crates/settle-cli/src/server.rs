//! Development HTTP server.
//!
//! Every request passes through the settle middleware first; whatever it
//! does not serve gets a plain 404.

use crate::error::{CliError, Result};
use crate::ui;
use axum::{
    Router,
    http::{StatusCode, Uri},
    response::IntoResponse,
};
use settle::DevMiddleware;
use settle_axum::RouterExt;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Build the router: 404 fallback behind the middleware, permissive CORS.
pub fn router(middleware: Arc<DevMiddleware>) -> Router {
    Router::new()
        .fallback(not_found)
        .settle(middleware)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

async fn not_found(uri: Uri) -> impl IntoResponse {
    (StatusCode::NOT_FOUND, format!("Not found: {}", uri.path()))
}

/// Serve until Ctrl+C, then close the middleware.
pub async fn run(addr: SocketAddr, middleware: Arc<DevMiddleware>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| CliError::Server(format!("Failed to bind to {}: {}", addr, e)))?;

    let app = router(Arc::clone(&middleware));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown(middleware))
        .await
        .map_err(|e| CliError::Server(format!("Server error: {}", e)))?;

    Ok(())
}

async fn shutdown(middleware: Arc<DevMiddleware>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    ui::info("Shutting down...");
    middleware.closed().await;
}
