use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::transcript::TranscriptItem;

/// Lifecycle of a live interview
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Acquiring the microphone
    Initializing,
    /// Opening the agent connection
    Connecting,
    /// Streaming both ways
    Live,
    /// Agent speech was cut off by the candidate; back to `Live` on the next event
    Interrupted,
    /// Tearing down after an end request
    Ending,
    /// Ended normally
    Closed,
    /// Ended by an error
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }
}

/// Why a session that went live stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum EndReason {
    /// The candidate ended the interview
    UserEnded,
    /// The agent closed the connection
    TransportClosed,
    /// The connection failed
    TransportError(String),
}

impl EndReason {
    pub fn is_failure(&self) -> bool {
        !matches!(self, EndReason::UserEnded)
    }

    /// Message shown to the candidate when the interview did not end on request
    pub fn notice(&self) -> Option<String> {
        match self {
            EndReason::UserEnded => None,
            EndReason::TransportClosed => Some(
                "The interviewer disconnected. Feedback is based on the conversation so far."
                    .to_string(),
            ),
            EndReason::TransportError(reason) => Some(format!(
                "The connection to the interviewer failed ({}). Feedback is based on the conversation so far.",
                reason
            )),
        }
    }
}

/// Statistics about a live interview
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Current lifecycle state
    pub state: SessionState,

    /// When the session was created
    pub started_at: DateTime<Utc>,

    /// Elapsed time in seconds
    pub duration_secs: f64,

    /// Audio chunks handed to the connection
    pub chunks_sent: u64,

    /// Captured chunks dropped because the connection was not open
    pub frames_dropped: u64,

    /// Agent audio deltas scheduled for playback
    pub audio_deltas_played: u64,

    /// Committed transcript items
    pub transcript_items: usize,
}

impl SessionStats {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            state: SessionState::Initializing,
            started_at,
            duration_secs: 0.0,
            chunks_sent: 0,
            frames_dropped: 0,
            audio_deltas_played: 0,
            transcript_items: 0,
        }
    }
}

/// Everything a finished session hands to the rest of the application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOutcome {
    pub session_id: String,
    /// Ordered transcript, possibly empty
    pub transcript: Vec<TranscriptItem>,
    pub end_reason: EndReason,
    pub stats: SessionStats,
}
