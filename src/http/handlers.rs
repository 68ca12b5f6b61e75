use super::state::AppState;
use crate::language::Language;
use crate::session::{SessionSnapshot, TranscriptEntry, UiIntent};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct TextRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    /// Transcript entry being answered
    pub entry_id: Uuid,
    pub accept: bool,
}

#[derive(Debug, Deserialize)]
pub struct LanguageRequest {
    pub language: Language,
}

#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Hand an intent to the session controller
fn dispatch(state: &AppState, intent: UiIntent) -> Response {
    match state.session.send(intent) {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(AcceptedResponse {
                status: "accepted".to_string(),
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to dispatch intent: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// GET /session
/// Current session snapshot
pub async fn get_session(State(state): State<AppState>) -> Json<SessionSnapshot> {
    Json(state.session.snapshot())
}

/// GET /session/transcript
pub async fn get_transcript(State(state): State<AppState>) -> Json<Vec<TranscriptEntry>> {
    Json(state.session.snapshot().transcript)
}

/// POST /session/login
pub async fn login(State(state): State<AppState>) -> Response {
    info!("Login requested");
    dispatch(&state, UiIntent::Login)
}

/// POST /session/mic
pub async fn press_mic(State(state): State<AppState>) -> Response {
    dispatch(&state, UiIntent::MicPress)
}

/// POST /session/text
pub async fn submit_text(State(state): State<AppState>, Json(req): Json<TextRequest>) -> Response {
    if req.text.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "text must not be empty".to_string(),
            }),
        )
            .into_response();
    }

    dispatch(&state, UiIntent::SubmitText { text: req.text })
}

/// POST /session/confirm
pub async fn confirm(State(state): State<AppState>, Json(req): Json<ConfirmRequest>) -> Response {
    dispatch(
        &state,
        UiIntent::Confirm {
            entry_id: req.entry_id,
            accept: req.accept,
        },
    )
}

/// POST /session/sos/request
pub async fn sos_request(State(state): State<AppState>) -> Response {
    dispatch(&state, UiIntent::SosRequest)
}

/// POST /session/sos/confirm
pub async fn sos_confirm(State(state): State<AppState>) -> Response {
    info!("SOS confirmed from UI");
    dispatch(&state, UiIntent::SosConfirm)
}

/// POST /session/sos/cancel
pub async fn sos_cancel(State(state): State<AppState>) -> Response {
    dispatch(&state, UiIntent::SosCancel)
}

/// POST /session/stop
/// Emergency stop
pub async fn emergency_stop(State(state): State<AppState>) -> Response {
    info!("Emergency stop pressed");
    dispatch(&state, UiIntent::EmergencyStop)
}

/// POST /session/language
pub async fn set_language(
    State(state): State<AppState>,
    Json(req): Json<LanguageRequest>,
) -> Response {
    dispatch(
        &state,
        UiIntent::SetLanguage {
            language: req.language,
        },
    )
}

/// POST /session/notice/dismiss
pub async fn dismiss_notice(State(state): State<AppState>) -> Response {
    dispatch(&state, UiIntent::DismissNotice)
}

/// POST /session/logout
pub async fn logout(State(state): State<AppState>) -> Response {
    dispatch(&state, UiIntent::Logout)
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
