use super::state::AppState;
use crate::error::LiveError;
use crate::session::{ConnectionStatus, SessionStats, StartOutcome};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use tracing::{error, info};

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub status: ConnectionStatus,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StopSessionResponse {
    pub status: ConnectionStatus,
    pub message: String,
    pub stats: SessionStats,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: error.into() })).into_response()
}

fn controller_gone(e: LiveError) -> Response {
    error!("Session controller unavailable: {}", e);
    error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /session/start
/// Connect a new live session
pub async fn start_session(State(state): State<AppState>) -> Response {
    info!("Starting live session");

    match state.session.start().await {
        Ok(StartOutcome::Started) => (
            StatusCode::OK,
            Json(StartSessionResponse {
                status: ConnectionStatus::Connected,
                message: "Session started".to_string(),
            }),
        )
            .into_response(),
        Ok(StartOutcome::AlreadyActive) => error_response(StatusCode::CONFLICT, "A session is already active"),
        Err(LiveError::ControllerGone) => controller_gone(LiveError::ControllerGone),
        Err(e) => {
            error!("Failed to start session: {}", e);
            // Report the user-facing message the controller settled on
            let message = match state.session.snapshot().await {
                Ok(snapshot) => snapshot.error.unwrap_or_else(|| e.to_string()),
                Err(_) => e.to_string(),
            };
            error_response(StatusCode::SERVICE_UNAVAILABLE, message)
        }
    }
}

/// POST /session/stop
/// Tear down the live session
pub async fn stop_session(State(state): State<AppState>) -> Response {
    info!("Stopping live session");

    match state.session.stop().await {
        Ok(stats) => (
            StatusCode::OK,
            Json(StopSessionResponse {
                status: ConnectionStatus::Disconnected,
                message: "Session stopped".to_string(),
                stats,
            }),
        )
            .into_response(),
        Err(e) => controller_gone(e),
    }
}

/// GET /session
/// Full observable state
pub async fn get_session(State(state): State<AppState>) -> Response {
    match state.session.snapshot().await {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(e) => controller_gone(e),
    }
}

/// GET /session/messages
/// Finalized message log
pub async fn get_messages(State(state): State<AppState>) -> Response {
    match state.session.snapshot().await {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot.messages)).into_response(),
        Err(e) => controller_gone(e),
    }
}

/// GET /session/stats
pub async fn get_stats(State(state): State<AppState>) -> Response {
    match state.session.stats().await {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(e) => controller_gone(e),
    }
}

/// GET /session/levels
/// Input and output analyser readings
pub async fn get_levels(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.session.levels()))
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
