//! Hand-off of finished interviews to report generation.
//!
//! Question and report generation are one-shot calls to a text-generation
//! service and live outside this crate; `ReportGenerator` is the seam they
//! plug into. `TranscriptWriter` persists each outcome to disk.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::session::{InterviewContext, SessionOutcome};
use crate::transcript::render_transcript;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedQuestion {
    pub question: String,
    pub ideal_answer_key: String,
}

/// Scores from 0 to 100
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewMetrics {
    pub clarity: f32,
    pub confidence: f32,
    pub technical_fit: f32,
    pub cultural_fit: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewReport {
    pub summary: String,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
    pub metrics: InterviewMetrics,
}

/// Text-generation collaborator
#[async_trait]
pub trait ReportGenerator: Send + Sync {
    async fn generate_questions(
        &self,
        context: &InterviewContext,
    ) -> Result<Vec<GeneratedQuestion>>;

    async fn generate_report(
        &self,
        transcript_text: &str,
        context: &InterviewContext,
    ) -> Result<InterviewReport>;
}

/// Render the outcome's transcript and ask the generator for a report.
///
/// Empty transcripts are passed through: an empty interview is still valid.
pub async fn request_report(
    generator: &dyn ReportGenerator,
    outcome: &SessionOutcome,
    context: &InterviewContext,
) -> Result<InterviewReport> {
    if let Some(notice) = outcome.end_reason.notice() {
        warn!("{}", notice);
    }

    let text = render_transcript(&outcome.transcript);
    generator
        .generate_report(&text, context)
        .await
        .with_context(|| format!("Failed to generate report for {}", outcome.session_id))
}

/// Files written for one interview
#[derive(Debug, Clone)]
pub struct SavedTranscript {
    pub json_path: PathBuf,
    pub text_path: PathBuf,
}

/// Persists finished interviews as `<id>.json` (full outcome) and `<id>.txt`
/// (rendered transcript)
pub struct TranscriptWriter {
    output_dir: PathBuf,
}

impl TranscriptWriter {
    pub fn new(output_dir: impl AsRef<Path>) -> Result<Self> {
        let output_dir = output_dir.as_ref().to_path_buf();
        fs::create_dir_all(&output_dir).context("Failed to create transcript directory")?;
        Ok(Self { output_dir })
    }

    pub fn write(&self, outcome: &SessionOutcome) -> Result<SavedTranscript> {
        let json_path = self.output_dir.join(format!("{}.json", outcome.session_id));
        let text_path = self.output_dir.join(format!("{}.txt", outcome.session_id));

        let json = serde_json::to_vec_pretty(outcome)?;
        fs::write(&json_path, json)
            .with_context(|| format!("Failed to write {:?}", json_path))?;
        fs::write(&text_path, render_transcript(&outcome.transcript))
            .with_context(|| format!("Failed to write {:?}", text_path))?;

        info!(
            "Saved transcript for {} ({} items) to {}",
            outcome.session_id,
            outcome.transcript.len(),
            self.output_dir.display()
        );

        Ok(SavedTranscript {
            json_path,
            text_path,
        })
    }
}
