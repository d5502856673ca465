use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::event::ServerEvent;
use crate::audio::EncodedAudioChunk;

// ============================================================================
// Outbound
// ============================================================================

/// First message on a new connection
#[derive(Debug, Serialize, Deserialize)]
pub struct SetupMessage {
    pub setup: Setup,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    pub system_instruction: Content,
    pub input_audio_transcription: Empty,
    pub output_audio_transcription: Empty,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    pub speech_config: SpeechConfig,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<Blob>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Empty {}

/// Base64 media payload
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    #[serde(default)]
    pub mime_type: String,
    pub data: String,
}

/// Streaming microphone audio
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInputMessage {
    pub realtime_input: RealtimeInput,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<Blob>,
}

impl SetupMessage {
    pub fn new(model: &str, voice: &str, instructions: &str) -> Self {
        Self {
            setup: Setup {
                model: model.to_string(),
                generation_config: GenerationConfig {
                    response_modalities: vec!["AUDIO".to_string()],
                    speech_config: SpeechConfig {
                        voice_config: VoiceConfig {
                            prebuilt_voice_config: PrebuiltVoiceConfig {
                                voice_name: voice.to_string(),
                            },
                        },
                    },
                },
                system_instruction: Content {
                    parts: vec![Part {
                        text: Some(instructions.to_string()),
                        inline_data: None,
                    }],
                },
                input_audio_transcription: Empty {},
                output_audio_transcription: Empty {},
            },
        }
    }
}

impl RealtimeInputMessage {
    pub fn from_chunk(chunk: &EncodedAudioChunk) -> Self {
        Self {
            realtime_input: RealtimeInput {
                media_chunks: vec![Blob {
                    mime_type: format!("audio/pcm;rate={}", chunk.sample_rate),
                    data: base64::engine::general_purpose::STANDARD.encode(&chunk.pcm),
                }],
            },
        }
    }
}

// ============================================================================
// Inbound
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    pub setup_complete: Option<serde_json::Value>,
    #[serde(default)]
    pub server_content: Option<ServerContent>,
    #[serde(default)]
    pub go_away: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<ServerError>,
}

/// Error report sent by the agent before it drops the connection
#[derive(Debug, Default, Deserialize)]
pub struct ServerError {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<Content>,
    #[serde(default)]
    pub output_transcription: Option<Transcription>,
    #[serde(default)]
    pub input_transcription: Option<Transcription>,
    #[serde(default)]
    pub turn_complete: bool,
    #[serde(default)]
    pub interrupted: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct Transcription {
    #[serde(default)]
    pub text: Option<String>,
}

/// A decoded inbound frame
#[derive(Debug, PartialEq, Eq)]
pub enum Inbound {
    /// Handshake acknowledged; the connection is open
    SetupComplete,
    /// Session events, in the order they must be processed
    Events(Vec<ServerEvent>),
}

/// Decode one inbound text frame.
///
/// Within a single `serverContent` the order is: audio parts, agent
/// transcription, candidate transcription, turn completion, interruption.
pub fn decode_server_message(text: &str) -> Inbound {
    let message: ServerMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            return Inbound::Events(vec![ServerEvent::Unrecognized(format!(
                "malformed message: {}",
                e
            ))])
        }
    };

    if message.setup_complete.is_some() {
        return Inbound::SetupComplete;
    }

    if let Some(err) = message.error {
        let reason = match err.code {
            Some(code) => format!("{}: {}", code, err.message),
            None => err.message,
        };
        return Inbound::Events(vec![ServerEvent::Error(reason)]);
    }

    let Some(content) = message.server_content else {
        let what = if message.go_away.is_some() {
            "goAway".to_string()
        } else {
            truncate_for_log(text, 200)
        };
        return Inbound::Events(vec![ServerEvent::Unrecognized(what)]);
    };

    let mut events = Vec::new();

    if let Some(turn) = content.model_turn {
        for part in turn.parts {
            let Some(blob) = part.inline_data else {
                continue;
            };
            match base64::engine::general_purpose::STANDARD.decode(&blob.data) {
                Ok(bytes) => events.push(ServerEvent::AudioDelta(bytes)),
                Err(e) => warn!("Skipping undecodable audio part: {}", e),
            }
        }
    }

    if let Some(text) = content.output_transcription.and_then(|t| t.text) {
        events.push(ServerEvent::OutputTextDelta(text));
    }

    if let Some(text) = content.input_transcription.and_then(|t| t.text) {
        events.push(ServerEvent::InputTextDelta(text));
    }

    if content.turn_complete {
        events.push(ServerEvent::TurnComplete);
    }

    if content.interrupted {
        events.push(ServerEvent::Interrupted);
    }

    Inbound::Events(events)
}

pub(crate) fn truncate_for_log(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
