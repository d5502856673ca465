/// Everything the remote agent can tell the session, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// PCM16 LE mono speech at the playback rate
    AudioDelta(Vec<u8>),
    /// Fragment of the agent's own speech transcription
    OutputTextDelta(String),
    /// Fragment of the candidate's speech transcription
    InputTextDelta(String),
    /// The current exchange is finished
    TurnComplete,
    /// The candidate barged in; queued agent speech must be silenced
    Interrupted,
    /// The connection ended normally
    Closed,
    /// The connection failed
    Error(String),
    /// A message this client does not understand. Logged and ignored.
    Unrecognized(String),
}

impl ServerEvent {
    /// After a terminal event the connection emits nothing further
    pub fn is_terminal(&self) -> bool {
        matches!(self, ServerEvent::Closed | ServerEvent::Error(_))
    }

    /// Short name for logging, without the payload
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::AudioDelta(_) => "audio_delta",
            ServerEvent::OutputTextDelta(_) => "output_text_delta",
            ServerEvent::InputTextDelta(_) => "input_text_delta",
            ServerEvent::TurnComplete => "turn_complete",
            ServerEvent::Interrupted => "interrupted",
            ServerEvent::Closed => "closed",
            ServerEvent::Error(_) => "error",
            ServerEvent::Unrecognized(_) => "unrecognized",
        }
    }
}
