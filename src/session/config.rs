use serde::{Deserialize, Serialize};

use crate::audio::{AudioBackendConfig, CAPTURE_SAMPLE_RATE, PLAYBACK_SAMPLE_RATE};

/// Longest resume / job description excerpt embedded in the agent instructions
pub const MAX_EXCERPT_CHARS: usize = 2000;

/// Question the interviewer opens with
pub const OPENING_QUESTION: &str = "Tell me about a time when you had to lead a team through a challenging project. How did you handle conflicts?";

/// Candidate material the interview is built around
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewContext {
    /// Resume text
    pub resume: String,
    /// Job description text
    pub job_description: String,
}

/// Configuration for one live interview
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique interview identifier
    pub session_id: String,

    /// Resume and job description
    pub context: InterviewContext,

    /// Agent model identifier
    pub model: String,

    /// Prebuilt voice the agent speaks with
    pub voice: String,

    /// Outbound wire rate for microphone audio
    pub capture_sample_rate: u32,

    /// Inbound wire rate for agent speech
    pub playback_sample_rate: u32,

    /// Samples per captured frame
    pub frame_size: usize,

    /// RMS multiplier for the volume meter
    pub volume_gain: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("interview-{}", uuid::Uuid::new_v4()),
            context: InterviewContext::default(),
            model: "models/gemini-2.5-flash-native-audio-preview-09-2025".to_string(),
            voice: "Kore".to_string(),
            capture_sample_rate: CAPTURE_SAMPLE_RATE,
            playback_sample_rate: PLAYBACK_SAMPLE_RATE,
            frame_size: 4096,
            volume_gain: 8.0,
        }
    }
}

impl SessionConfig {
    /// Capture settings for this interview's input device
    pub fn backend(&self) -> AudioBackendConfig {
        AudioBackendConfig {
            frame_size: self.frame_size,
        }
    }
}

/// Hiring-manager persona with the interview context embedded
pub fn build_instructions(context: &InterviewContext) -> String {
    format!(
        "You are a professional hiring manager.\n\
         CANDIDATE RESUME: \"{}\"\n\
         JOB DESCRIPTION: \"{}\"\n\n\
         Start by asking: \"{}\"\n\
         Wait for the answer, then follow up or move to the next question.\n\
         Keep responses concise.",
        truncate_chars(&context.resume, MAX_EXCERPT_CHARS),
        truncate_chars(&context.job_description, MAX_EXCERPT_CHARS),
        OPENING_QUESTION,
    )
}

/// Cut to at most `max` characters on a char boundary
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
