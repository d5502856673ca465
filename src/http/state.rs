use crate::config::Config;
use crate::error::SessionError;
use crate::report::TranscriptWriter;
use crate::session::{SessionHandle, SessionOutcome};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// A session running on its own task
pub struct LiveInterview {
    pub handle: SessionHandle,
    pub task: JoinHandle<Result<SessionOutcome, SessionError>>,
}

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Running interviews (interview_id → session)
    pub sessions: Arc<RwLock<HashMap<String, LiveInterview>>>,
    pub config: Arc<Config>,
    pub writer: Arc<TranscriptWriter>,
}

impl AppState {
    pub fn new(config: Config, writer: TranscriptWriter) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            config: Arc::new(config),
            writer: Arc::new(writer),
        }
    }
}
