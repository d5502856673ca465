//! HTTP API server for driving interviews from a browser front end
//!
//! This module provides a REST API for controlling live interviews:
//! - POST /interviews/start - Start a new interview
//! - POST /interviews/:id/end - End an interview and return its transcript
//! - POST /interviews/:id/mute - Mute or unmute the microphone
//! - GET /interviews/:id/status - Query session state, speaking and volume
//! - GET /interviews/:id/transcript - Get the committed transcript so far
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::{AppState, LiveInterview};
