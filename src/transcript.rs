//! Turn-by-turn transcript assembly from streaming text deltas.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Who spoke a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The candidate
    User,
    /// The AI interviewer
    Agent,
}

impl Role {
    /// Speaker label used in rendered transcripts
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "Candidate",
            Role::Agent => "Interviewer",
        }
    }
}

/// One committed turn. Never modified after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptItem {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// What to do with text that never saw a turn boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingTurnPolicy {
    /// Commit whatever is pending, as if the turn had completed
    Flush,
    /// Drop it
    Discard,
}

/// Accumulates per-role deltas and commits them on turn boundaries
#[derive(Debug, Default)]
pub struct TranscriptAssembler {
    pending_user: String,
    pending_agent: String,
    items: Vec<TranscriptItem>,
}

impl TranscriptAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_input_text_delta(&mut self, text: &str) {
        self.pending_user.push_str(text);
    }

    pub fn on_output_text_delta(&mut self, text: &str) {
        self.pending_agent.push_str(text);
    }

    /// Commit the pending turn: user before agent, skipping blank text.
    ///
    /// Returns the items committed by this call.
    pub fn on_turn_complete(&mut self) -> &[TranscriptItem] {
        let start = self.items.len();
        let now = Utc::now();

        for (role, pending) in [
            (Role::User, &mut self.pending_user),
            (Role::Agent, &mut self.pending_agent),
        ] {
            let text = pending.trim();
            if !text.is_empty() {
                self.items.push(TranscriptItem {
                    role,
                    text: text.to_string(),
                    timestamp: now,
                });
            }
            pending.clear();
        }

        let committed = &self.items[start..];
        debug!("Turn complete: {} items committed", committed.len());
        committed
    }

    /// Resolve text still pending at session end, then hand over the transcript
    pub fn finish(mut self, policy: PendingTurnPolicy) -> Vec<TranscriptItem> {
        match policy {
            PendingTurnPolicy::Flush => {
                self.on_turn_complete();
            }
            PendingTurnPolicy::Discard => {
                if self.has_pending() {
                    debug!("Discarding pending turn text");
                }
            }
        }
        self.items
    }

    pub fn has_pending(&self) -> bool {
        !self.pending_user.trim().is_empty() || !self.pending_agent.trim().is_empty()
    }

    pub fn pending_user(&self) -> &str {
        &self.pending_user
    }

    pub fn pending_agent(&self) -> &str {
        &self.pending_agent
    }

    /// Committed items so far (read-only live preview)
    pub fn items(&self) -> &[TranscriptItem] {
        &self.items
    }
}

/// Plain-text transcript for report generation, one `Speaker: text` line per item
pub fn render_transcript(items: &[TranscriptItem]) -> String {
    items
        .iter()
        .map(|item| format!("{}: {}", item.role.label(), item.text))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Agent).unwrap(), "\"agent\"");
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
    }

    #[test]
    fn test_pending_cleared_even_when_blank() {
        let mut t = TranscriptAssembler::new();
        t.on_input_text_delta("   ");
        assert!(t.on_turn_complete().is_empty());
        assert_eq!(t.pending_user(), "");
    }
}
