//! HTTP request handlers

use crate::api::server::AppContext;
use crate::cache::CacheStats;
use crate::controller::Progress;
use crate::error::Error;
use crate::state::DirectorStatus;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
    pub git_hash: String,
    pub build_timestamp: String,
    pub build_profile: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub director: DirectorStatus,
    pub cache: CacheStats,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartResponse {
    pub session_id: u64,
}

/// Outcome of a control operation
#[derive(Debug, Serialize, Deserialize)]
pub struct ControlResponse {
    /// False when the call was a no-op (already paused, index out of range, ...)
    pub applied: bool,
    pub current: usize,
    pub total: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListenerRequest {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn control_response(applied: bool, progress: Progress) -> Json<ControlResponse> {
    Json(ControlResponse {
        applied,
        current: progress.current,
        total: progress.total,
    })
}

// ============================================================================
// Health / Status
// ============================================================================

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "airwave-director".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: env!("GIT_HASH").to_string(),
        build_timestamp: env!("BUILD_TIMESTAMP").to_string(),
        build_profile: env!("BUILD_PROFILE").to_string(),
    })
}

/// GET /status
pub async fn status(State(ctx): State<AppContext>) -> Json<StatusResponse> {
    Json(StatusResponse {
        director: ctx.scheduler.state().status(),
        cache: ctx.scheduler.cache().stats(),
    })
}

// ============================================================================
// Show lifecycle
// ============================================================================

/// POST /show/start
pub async fn start_show(
    State(ctx): State<AppContext>,
) -> Result<Json<StartResponse>, (StatusCode, Json<ErrorResponse>)> {
    match ctx.scheduler.start() {
        Ok(session_id) => {
            info!("Show started via API");
            Ok(Json(StartResponse { session_id }))
        }
        Err(Error::InvalidState(message)) => Err((StatusCode::CONFLICT, Json(ErrorResponse { error: message }))),
        Err(e) => {
            warn!("Failed to start show: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse { error: e.to_string() }),
            ))
        }
    }
}

/// POST /show/stop
pub async fn stop_show(State(ctx): State<AppContext>) -> Json<ControlResponse> {
    let applied = ctx.scheduler.stop();
    control_response(applied, ctx.scheduler.controller().progress())
}

/// POST /show/request - listener request woven into the next generated timeline
pub async fn submit_request(
    State(ctx): State<AppContext>,
    Json(request): Json<ListenerRequest>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    let text = request.text.trim();
    if text.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "request text is empty".to_string(),
            }),
        ));
    }
    info!("Listener request: {}", text);
    ctx.scheduler.state().set_user_request(text.to_string());
    Ok(StatusCode::ACCEPTED)
}

// ============================================================================
// Playback control
// ============================================================================

/// POST /playback/pause
pub async fn pause(State(ctx): State<AppContext>) -> Json<ControlResponse> {
    let controller = ctx.scheduler.controller();
    control_response(controller.pause(), controller.progress())
}

/// POST /playback/resume
pub async fn resume(State(ctx): State<AppContext>) -> Json<ControlResponse> {
    let controller = ctx.scheduler.controller();
    control_response(controller.resume(), controller.progress())
}

/// POST /playback/skip/next
pub async fn skip_next(State(ctx): State<AppContext>) -> Json<ControlResponse> {
    let controller = ctx.scheduler.controller();
    control_response(controller.skip_next(), controller.progress())
}

/// POST /playback/skip/previous
pub async fn skip_previous(State(ctx): State<AppContext>) -> Json<ControlResponse> {
    let controller = ctx.scheduler.controller();
    control_response(controller.skip_previous(), controller.progress())
}

/// POST /playback/skip/:index
pub async fn skip_to_index(State(ctx): State<AppContext>, Path(index): Path<usize>) -> Json<ControlResponse> {
    let controller = ctx.scheduler.controller();
    control_response(controller.skip_to_index(index), controller.progress())
}
