pub mod audio;
pub mod config;
pub mod error;
pub mod http;
pub mod report;
pub mod session;
pub mod transcript;
pub mod transport;

pub use audio::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFile, AudioFrame, AudioSource,
    CaptureEncoder, EncodedAudioChunk, PlaybackOutput, PlaybackScheduler,
};
pub use config::Config;
pub use error::{CaptureError, Result, SessionError};
pub use http::{create_router, AppState};
pub use report::{request_report, ReportGenerator, TranscriptWriter};
pub use session::{
    EndReason, InterviewContext, InterviewSession, SessionConfig, SessionHandle, SessionOutcome,
    SessionState, SessionStats,
};
pub use transcript::{
    render_transcript, PendingTurnPolicy, Role, TranscriptAssembler, TranscriptItem,
};
pub use transport::{AgentTransport, ServerEvent, StreamingTransportClient};
