use super::state::{AppState, LiveInterview};
use crate::audio::AudioSource;
use crate::session::{InterviewContext, SessionOutcome, SessionState, SessionStats};
use crate::transcript::TranscriptItem;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StartInterviewRequest {
    /// Optional interview ID (if not provided, generate UUID)
    pub interview_id: Option<String>,

    pub resume: String,

    pub job_description: String,

    /// Prebuilt voice override
    pub voice: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StartInterviewResponse {
    pub interview_id: String,
    pub state: SessionState,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct EndInterviewResponse {
    pub interview_id: String,
    /// Shown to the candidate when the interview did not end on request
    pub notice: Option<String>,
    pub outcome: SessionOutcome,
}

#[derive(Debug, Deserialize)]
pub struct MuteRequest {
    pub muted: bool,
}

#[derive(Debug, Serialize)]
pub struct InterviewStatus {
    pub interview_id: String,
    pub speaking: bool,
    pub volume: f32,
    pub stats: SessionStats,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}

fn not_found(interview_id: &str) -> Response {
    error_response(
        StatusCode::NOT_FOUND,
        format!("Interview {} not found", interview_id),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /interviews/start
/// Start a live interview on the default microphone and speaker.
///
/// Responds once the session is live, or with the start-up error if the
/// microphone or agent connection could not be opened.
pub async fn start_interview(
    State(state): State<AppState>,
    Json(req): Json<StartInterviewRequest>,
) -> Response {
    let mut session_config = state.config.session(
        InterviewContext {
            resume: req.resume,
            job_description: req.job_description,
        },
        req.voice,
    );
    if let Some(id) = req.interview_id {
        session_config.session_id = id;
    }
    let interview_id = session_config.session_id.clone();

    info!("Starting interview: {}", interview_id);

    // Check if already running
    {
        let sessions = state.sessions.read().await;
        if sessions.contains_key(&interview_id) {
            return error_response(
                StatusCode::CONFLICT,
                format!("Interview {} is already running", interview_id),
            );
        }
    }

    let (session, handle) = match state
        .config
        .open_session(session_config, AudioSource::Microphone)
        .await
    {
        Ok(pair) => pair,
        Err(e) => {
            error!("Failed to create session: {:#}", e);
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to create session: {:#}", e),
            );
        }
    };

    let mut state_rx = handle.watch_state();
    let task = tokio::spawn(session.run());

    // Wait for the session to go live or give up
    let reached = state_rx
        .wait_for(|s| matches!(s, SessionState::Live) || s.is_terminal())
        .await
        .map(|s| *s)
        .unwrap_or(SessionState::Failed);

    if reached.is_terminal() {
        let message = match task.await {
            Ok(Err(e)) => e.to_string(),
            Ok(Ok(_)) => "Interview ended before it started".to_string(),
            Err(e) => format!("Session task failed: {}", e),
        };
        error!("Interview {} failed to start: {}", interview_id, message);
        return error_response(StatusCode::SERVICE_UNAVAILABLE, message);
    }

    {
        let mut sessions = state.sessions.write().await;
        sessions.insert(interview_id.clone(), LiveInterview { handle, task });
    }

    info!("Interview {} is live", interview_id);

    (
        StatusCode::OK,
        Json(StartInterviewResponse {
            interview_id: interview_id.clone(),
            state: reached,
            message: format!("Interview {} started", interview_id),
        }),
    )
        .into_response()
}

/// POST /interviews/:interview_id/end
/// End an interview and return its transcript
pub async fn end_interview(
    State(state): State<AppState>,
    Path(interview_id): Path<String>,
) -> Response {
    info!("Ending interview: {}", interview_id);

    // Find and remove session
    let live = {
        let mut sessions = state.sessions.write().await;
        sessions.remove(&interview_id)
    };

    let Some(live) = live else {
        return not_found(&interview_id);
    };

    live.handle.end();

    let outcome = match live.task.await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            error!("Interview {} failed: {}", interview_id, e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
        }
        Err(e) => {
            error!("Interview {} task failed: {}", interview_id, e);
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Session task failed: {}", e),
            );
        }
    };

    if let Err(e) = state.writer.write(&outcome) {
        warn!("Failed to save transcript for {}: {:#}", interview_id, e);
    }

    (
        StatusCode::OK,
        Json(EndInterviewResponse {
            interview_id,
            notice: outcome.end_reason.notice(),
            outcome,
        }),
    )
        .into_response()
}

/// POST /interviews/:interview_id/mute
pub async fn set_mute(
    State(state): State<AppState>,
    Path(interview_id): Path<String>,
    Json(req): Json<MuteRequest>,
) -> Response {
    let sessions = state.sessions.read().await;

    match sessions.get(&interview_id) {
        Some(live) => {
            live.handle.set_muted(req.muted);
            info!("Interview {} muted: {}", interview_id, req.muted);
            StatusCode::NO_CONTENT.into_response()
        }
        None => not_found(&interview_id),
    }
}

/// GET /interviews/:interview_id/status
pub async fn get_interview_status(
    State(state): State<AppState>,
    Path(interview_id): Path<String>,
) -> Response {
    let sessions = state.sessions.read().await;

    match sessions.get(&interview_id) {
        Some(live) => (
            StatusCode::OK,
            Json(InterviewStatus {
                interview_id: interview_id.clone(),
                speaking: live.handle.is_speaking(),
                volume: live.handle.volume(),
                stats: live.handle.stats(),
            }),
        )
            .into_response(),
        None => not_found(&interview_id),
    }
}

/// GET /interviews/:interview_id/transcript
/// Committed transcript so far
pub async fn get_interview_transcript(
    State(state): State<AppState>,
    Path(interview_id): Path<String>,
) -> Response {
    let sessions = state.sessions.read().await;

    match sessions.get(&interview_id) {
        Some(live) => {
            let transcript: Vec<TranscriptItem> = live.handle.transcript_preview();
            (StatusCode::OK, Json(transcript)).into_response()
        }
        None => not_found(&interview_id),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
