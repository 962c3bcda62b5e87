use super::state::AppState;
use crate::error::{CaptureError, ErrorKind, SessionError};
use crate::session::SessionSnapshot;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StartCaptureResponse {
    pub session_id: Uuid,
    pub snapshot: SessionSnapshot,
}

#[derive(Debug, Serialize)]
pub struct NavigationResponse {
    pub last: Option<String>,
    pub targets: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: SessionError,
}

fn error_response(err: CaptureError) -> Response {
    let status = match err.kind() {
        ErrorKind::InvalidTransition | ErrorKind::SessionActive => StatusCode::CONFLICT,
        ErrorKind::PipelineClosed => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!("Capture command rejected: {}", err);

    (
        status,
        Json(ErrorResponse {
            error: SessionError::from(&err),
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /capture/start
pub async fn start_capture(State(state): State<AppState>) -> Response {
    match state.capture.start().await {
        Ok(session_id) => {
            info!("Capture started: {}", session_id);
            (
                StatusCode::OK,
                Json(StartCaptureResponse {
                    session_id,
                    snapshot: state.capture.snapshot(),
                }),
            )
                .into_response()
        }
        Err(e) => error_response(e),
    }
}

/// POST /capture/stop
/// Returns as soon as the upload is under way; poll /capture/status for the result
pub async fn stop_capture(State(state): State<AppState>) -> Response {
    match state.capture.stop().await {
        Ok(()) => (StatusCode::OK, Json(state.capture.snapshot())).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /capture/cancel
pub async fn cancel_capture(State(state): State<AppState>) -> Response {
    match state.capture.cancel().await {
        Ok(()) => (StatusCode::OK, Json(state.capture.snapshot())).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /capture/reset
pub async fn reset_capture(State(state): State<AppState>) -> Response {
    match state.capture.reset().await {
        Ok(()) => (StatusCode::OK, Json(state.capture.snapshot())).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /capture/status
pub async fn capture_status(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.capture.snapshot()))
}

/// GET /capture/form
pub async fn listing_form(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.host.form()))
}

/// GET /capture/navigation
pub async fn navigation_targets(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(NavigationResponse {
            last: state.host.last_target(),
            targets: state.host.targets(),
        }),
    )
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
