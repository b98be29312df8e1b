use super::state::AppState;
use crate::session::{SessionHandle, SessionStats};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use tracing::{error, info, warn};

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub session_id: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct StopSessionResponse {
    pub session_id: String,
    pub status: String,
    pub stats: SessionStats,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}

fn no_session() -> Response {
    error_response(StatusCode::NOT_FOUND, "No active session".to_string())
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /session/start
/// Start listening, unless a session is already running
///
/// The slot is reserved before connecting, so a stop request can abandon a
/// start that is still in progress.
pub async fn start_session(State(state): State<AppState>) -> impl IntoResponse {
    let (session_id, startup) = {
        let mut slot = state.session.write().await;

        if let Some(handle) = slot.as_ref() {
            if !handle.is_finished() {
                return error_response(
                    StatusCode::CONFLICT,
                    format!("Session {} is already running", handle.session_id()),
                );
            }
            info!("Replacing ended session {}", handle.session_id());
        }

        let session = match (state.factory)() {
            Ok(session) => session,
            Err(e) => {
                error!("Failed to create session: {}", e);
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Failed to create session: {e}"),
                );
            }
        };

        let (handle, startup) = SessionHandle::launch(session);
        let session_id = handle.session_id().to_string();
        *slot = Some(handle);
        (session_id, startup)
    };

    if startup.listening().await {
        info!("Session {} started", session_id);
        return (
            StatusCode::OK,
            Json(StartSessionResponse {
                session_id,
                status: "listening".to_string(),
            }),
        )
            .into_response();
    }

    // The session ended before listening; collect its outcome unless a stop
    // request already took it
    let handle = {
        let mut slot = state.session.write().await;
        if slot
            .as_ref()
            .is_some_and(|handle| handle.session_id() == session_id)
        {
            slot.take()
        } else {
            None
        }
    };

    match handle {
        Some(handle) => match handle.join().await {
            Err(e) => {
                warn!("Failed to start session: {}", e);
                let status = if e.is_fatal_to_start() {
                    StatusCode::BAD_GATEWAY
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                };
                error_response(status, e.to_string())
            }
            Ok(_) => stopped_while_starting(&session_id),
        },
        None => stopped_while_starting(&session_id),
    }
}

fn stopped_while_starting(session_id: &str) -> Response {
    info!("Session {} stopped before it was listening", session_id);
    error_response(
        StatusCode::CONFLICT,
        format!("Session {session_id} was stopped before it was listening"),
    )
}

/// POST /session/stop
/// Stop the active session and return its final stats
pub async fn stop_session(State(state): State<AppState>) -> impl IntoResponse {
    let handle = state.session.write().await.take();

    let Some(handle) = handle else {
        return no_session();
    };

    let session_id = handle.session_id().to_string();
    match handle.stop().await {
        Ok(stats) => {
            info!("Session {} stopped", session_id);
            (
                StatusCode::OK,
                Json(StopSessionResponse {
                    session_id,
                    status: "stopped".to_string(),
                    stats,
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!("Failed to stop session {}: {}", session_id, e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to stop session: {e}"),
            )
        }
    }
}

/// GET /session/status
pub async fn session_status(State(state): State<AppState>) -> impl IntoResponse {
    match state.session.read().await.as_ref() {
        Some(handle) => (StatusCode::OK, Json(handle.stats())).into_response(),
        None => no_session(),
    }
}

/// GET /session/exchanges
/// Transcript/reply pairs accumulated so far
pub async fn session_exchanges(State(state): State<AppState>) -> impl IntoResponse {
    match state.session.read().await.as_ref() {
        Some(handle) => (StatusCode::OK, Json(handle.exchanges().await)).into_response(),
        None => no_session(),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
