// Integration tests for the post-interview hand-off: persisted transcripts
// and report requests

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use interview_live::report::{
    request_report, GeneratedQuestion, InterviewMetrics, InterviewReport, ReportGenerator,
    TranscriptWriter,
};
use interview_live::session::{
    EndReason, InterviewContext, SessionOutcome, SessionState, SessionStats,
};
use interview_live::transcript::{Role, TranscriptItem};
use std::sync::Mutex;

fn item(role: Role, text: &str) -> TranscriptItem {
    TranscriptItem {
        role,
        text: text.to_string(),
        timestamp: Utc::now(),
    }
}

fn outcome(end_reason: EndReason, transcript: Vec<TranscriptItem>) -> SessionOutcome {
    let mut stats = SessionStats::new(Utc::now());
    stats.state = if end_reason.is_failure() {
        SessionState::Failed
    } else {
        SessionState::Closed
    };
    SessionOutcome {
        session_id: "interview-42".to_string(),
        transcript,
        end_reason,
        stats,
    }
}

/// Records the transcript text it was asked to evaluate
#[derive(Default)]
struct RecordingGenerator {
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl ReportGenerator for RecordingGenerator {
    async fn generate_questions(
        &self,
        _context: &InterviewContext,
    ) -> Result<Vec<GeneratedQuestion>> {
        Ok(vec![GeneratedQuestion {
            question: "Why Rust?".into(),
            ideal_answer_key: "Safety and speed".into(),
        }])
    }

    async fn generate_report(
        &self,
        transcript_text: &str,
        _context: &InterviewContext,
    ) -> Result<InterviewReport> {
        self.seen.lock().unwrap().push(transcript_text.to_string());
        Ok(InterviewReport {
            summary: "Solid".into(),
            strengths: vec!["Clarity".into()],
            improvements: vec![],
            metrics: InterviewMetrics {
                clarity: 80.0,
                confidence: 70.0,
                technical_fit: 90.0,
                cultural_fit: 75.0,
            },
        })
    }
}

#[tokio::test]
async fn test_report_gets_rendered_transcript() -> Result<()> {
    let generator = RecordingGenerator::default();
    let finished = outcome(
        EndReason::UserEnded,
        vec![
            item(Role::Agent, "Why this role?"),
            item(Role::User, "Growth."),
        ],
    );

    let report = request_report(&generator, &finished, &InterviewContext::default()).await?;

    assert_eq!(report.summary, "Solid");
    assert_eq!(
        generator.seen.lock().unwrap().as_slice(),
        ["Interviewer: Why this role?\nCandidate: Growth.".to_string()]
    );
    Ok(())
}

#[tokio::test]
async fn test_report_for_empty_failed_interview() -> Result<()> {
    let generator = RecordingGenerator::default();
    let finished = outcome(EndReason::TransportClosed, Vec::new());

    request_report(&generator, &finished, &InterviewContext::default()).await?;

    assert_eq!(generator.seen.lock().unwrap().as_slice(), [String::new()]);
    Ok(())
}

#[test]
fn test_writer_saves_json_and_text() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let writer = TranscriptWriter::new(dir.path().join("nested"))?;
    let finished = outcome(
        EndReason::TransportError("1011: internal error".into()),
        vec![item(Role::Agent, "Hello")],
    );

    let saved = writer.write(&finished)?;

    assert_eq!(std::fs::read_to_string(&saved.text_path)?, "Interviewer: Hello");

    let json: serde_json::Value = serde_json::from_slice(&std::fs::read(&saved.json_path)?)?;
    assert_eq!(json["session_id"], "interview-42");
    assert_eq!(json["end_reason"]["kind"], "transport_error");
    assert_eq!(json["transcript"][0]["role"], "agent");
    assert_eq!(json["stats"]["state"], "failed");

    let restored: SessionOutcome = serde_json::from_value(json)?;
    assert_eq!(restored.transcript, finished.transcript);

    Ok(())
}
