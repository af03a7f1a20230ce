//! HTTP server setup and routing

use crate::error::{Error, Result};
use crate::scheduler::ShowScheduler;
use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub scheduler: Arc<ShowScheduler>,
}

/// Build the control router
pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(super::handlers::health))
        .route("/status", get(super::handlers::status))
        // Show lifecycle
        .route("/show/start", post(super::handlers::start_show))
        .route("/show/stop", post(super::handlers::stop_show))
        .route("/show/request", post(super::handlers::submit_request))
        // Playback control
        .route("/playback/pause", post(super::handlers::pause))
        .route("/playback/resume", post(super::handlers::resume))
        .route("/playback/skip/next", post(super::handlers::skip_next))
        .route("/playback/skip/previous", post(super::handlers::skip_previous))
        .route("/playback/skip/:index", post(super::handlers::skip_to_index))
        // SSE event stream
        .route("/events", get(super::sse::event_stream))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve the control API until `shutdown` resolves
pub async fn run(
    addr: SocketAddr,
    scheduler: Arc<ShowScheduler>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = create_router(AppContext { scheduler });

    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Config(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("HTTP server stopped");
    Ok(())
}
