use thiserror::Error;

/// Result type for live interview operations.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Why the microphone could not be acquired.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// The user (or the OS) refused access to the input device.
    #[error("microphone permission denied")]
    PermissionDenied,

    /// No usable input device, or it failed to open.
    #[error("input device unavailable: {0}")]
    DeviceUnavailable(String),
}

/// Errors raised by the live session engine.
///
/// Only `CaptureUnavailable` and `Connect` ever reach the caller of a session;
/// the rest are recovered locally or folded into the session outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Microphone could not be opened. Fatal, aborts session start.
    #[error("capture unavailable: {0}")]
    CaptureUnavailable(#[from] CaptureError),

    /// Remote agent unreachable or rejected the handshake. Fatal, aborts session start.
    #[error("connect error: {0}")]
    Connect(String),

    /// Send attempted before the connection was open. The frame is dropped.
    #[error("not connected")]
    NotConnected,

    /// Inbound audio delta could not be decoded. The delta is skipped.
    #[error("decode error: {0}")]
    Decode(String),

    /// Connection failed while live.
    #[error("transport error: {0}")]
    Transport(String),

    /// Connection closed while live.
    #[error("connection closed")]
    Closed,
}

impl SessionError {
    /// Whether this error prevents the session from ever going live.
    pub fn is_fatal_at_start(&self) -> bool {
        matches!(self, Self::CaptureUnavailable(_) | Self::Connect(_))
    }
}
