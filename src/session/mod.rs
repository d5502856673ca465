//! Live interview session management
//!
//! This module provides the `InterviewSession` controller that manages:
//! - Microphone acquisition and release
//! - The agent connection and its handshake
//! - Routing server events to playback and transcript assembly
//! - Ordered teardown on normal end, failure, or cancellation

mod config;
mod session;
mod stats;

pub use config::{
    build_instructions, truncate_chars, InterviewContext, SessionConfig, MAX_EXCERPT_CHARS,
    OPENING_QUESTION,
};
pub use session::{InterviewSession, SessionCommand, SessionHandle};
pub use stats::{EndReason, SessionOutcome, SessionState, SessionStats};
