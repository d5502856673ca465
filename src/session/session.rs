use super::config::{build_instructions, SessionConfig};
use super::stats::{EndReason, SessionOutcome, SessionState, SessionStats};
use crate::audio::{
    AudioBackend, CaptureEncoder, CapturedChunk, EncoderConfig, PlaybackOutput, PlaybackScheduler,
};
use crate::error::{Result, SessionError};
use crate::transcript::{PendingTurnPolicy, TranscriptAssembler, TranscriptItem};
use crate::transport::{AgentSessionConfig, AgentTransport, ServerEvent};
use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Requests from the outside world to a running session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    SetMuted(bool),
    End,
}

/// Read-only view and controls for a running session.
///
/// Cloneable; the session ends when `end` is called or every handle is dropped.
#[derive(Clone)]
pub struct SessionHandle {
    session_id: String,
    commands: mpsc::UnboundedSender<SessionCommand>,
    state: watch::Receiver<SessionState>,
    speaking: watch::Receiver<bool>,
    volume: watch::Receiver<f32>,
    transcript: watch::Receiver<Vec<TranscriptItem>>,
    stats: watch::Receiver<SessionStats>,
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Ask the session to end gracefully. Safe at any point, including before
    /// the microphone or connection are ready.
    pub fn end(&self) {
        let _ = self.commands.send(SessionCommand::End);
    }

    pub fn set_muted(&self, muted: bool) {
        let _ = self.commands.send(SessionCommand::SetMuted(muted));
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Whether agent speech is currently playing
    pub fn is_speaking(&self) -> bool {
        *self.speaking.borrow()
    }

    pub fn watch_speaking(&self) -> watch::Receiver<bool> {
        self.speaking.clone()
    }

    /// Latest microphone volume estimate in `[0, 1]`
    pub fn volume(&self) -> f32 {
        *self.volume.borrow()
    }

    /// Snapshot of the committed transcript so far
    pub fn transcript_preview(&self) -> Vec<TranscriptItem> {
        self.transcript.borrow().clone()
    }

    pub fn stats(&self) -> SessionStats {
        let mut stats = self.stats.borrow().clone();
        stats.state = self.state();
        if !stats.state.is_terminal() {
            stats.duration_secs = elapsed_secs(stats.started_at);
        }
        stats
    }
}

/// Drives one live interview from microphone acquisition to teardown.
///
/// Every native resource (microphone, connection, playback output) is owned
/// here and released exactly once, on every exit path.
pub struct InterviewSession {
    config: SessionConfig,
    microphone: Box<dyn AudioBackend>,
    transport: Box<dyn AgentTransport>,
    playback: PlaybackScheduler,
    transcript: TranscriptAssembler,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    state: watch::Sender<SessionState>,
    volume: watch::Sender<f32>,
    preview: watch::Sender<Vec<TranscriptItem>>,
    stats: watch::Sender<SessionStats>,
    muted: bool,
    released: bool,
}

impl InterviewSession {
    /// Create a session and the handle that controls it
    pub fn new(
        config: SessionConfig,
        microphone: Box<dyn AudioBackend>,
        transport: Box<dyn AgentTransport>,
        output: Box<dyn PlaybackOutput>,
    ) -> (Self, SessionHandle) {
        info!(
            "Creating interview session: {} (mic: {})",
            config.session_id,
            microphone.name()
        );

        let playback = PlaybackScheduler::with_sample_rate(output, config.playback_sample_rate);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Initializing);
        let (volume_tx, volume_rx) = watch::channel(0.0f32);
        let (preview_tx, preview_rx) = watch::channel(Vec::new());
        let (stats_tx, stats_rx) = watch::channel(SessionStats::new(Utc::now()));

        let handle = SessionHandle {
            session_id: config.session_id.clone(),
            commands: command_tx,
            state: state_rx,
            speaking: playback.subscribe_speaking(),
            volume: volume_rx,
            transcript: preview_rx,
            stats: stats_rx,
        };

        let session = Self {
            config,
            microphone,
            transport,
            playback,
            transcript: TranscriptAssembler::new(),
            commands: command_rx,
            state: state_tx,
            volume: volume_tx,
            preview: preview_tx,
            stats: stats_tx,
            muted: false,
            released: false,
        };

        (session, handle)
    }

    /// Run the interview to completion.
    ///
    /// Start-up failures (`CaptureUnavailable`, `Connect`) are returned as
    /// errors. Once live, the session always yields an outcome carrying the
    /// transcript, including when the connection drops.
    pub async fn run(mut self) -> Result<SessionOutcome> {
        // Initializing: the microphone request may be abandoned by an end request
        let frames = tokio::select! {
            started = self.microphone.start() => match started {
                Ok(frames) => frames,
                Err(e) => {
                    error!("Microphone unavailable: {}", e);
                    return Err(self.fail_start(SessionError::CaptureUnavailable(e)).await);
                }
            },
            _ = wait_for_end(&mut self.commands, &mut self.muted) => {
                info!("Session ended while requesting the microphone");
                return Ok(self.finish(EndReason::UserEnded).await);
            }
        };

        let mut encoder = CaptureEncoder::new(
            frames,
            EncoderConfig {
                target_sample_rate: self.config.capture_sample_rate,
                volume_gain: self.config.volume_gain,
            },
        );
        encoder.set_muted(self.muted);

        // Connecting
        self.set_state(SessionState::Connecting);
        let agent_config = AgentSessionConfig {
            model: self.config.model.clone(),
            voice: self.config.voice.clone(),
            instructions: build_instructions(&self.config.context),
        };

        let mut dropped = 0u64;
        let connected = {
            let connect = self.transport.connect(&agent_config);
            tokio::pin!(connect);
            loop {
                tokio::select! {
                    result = &mut connect => break Some(result),
                    command = self.commands.recv() => match command {
                        Some(SessionCommand::SetMuted(muted)) => encoder.set_muted(muted),
                        Some(SessionCommand::End) | None => break None,
                    },
                    // Audio captured before the connection opens is not buffered
                    Some(_) = encoder.next_chunk() => dropped += 1,
                }
            }
        };
        self.stats.send_modify(|s| s.frames_dropped += dropped);

        match connected {
            None => {
                info!("Session ended while connecting");
                return Ok(self.finish(EndReason::UserEnded).await);
            }
            Some(Err(e)) => {
                error!("Agent connection failed: {}", e);
                return Err(self.fail_start(e).await);
            }
            Some(Ok(())) => {}
        }

        // Live
        self.set_state(SessionState::Live);
        let end_reason = loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(SessionCommand::SetMuted(muted)) => {
                        encoder.set_muted(muted);
                        if muted {
                            self.volume.send_replace(0.0);
                        }
                    }
                    Some(SessionCommand::End) | None => break EndReason::UserEnded,
                },
                Some(captured) = encoder.next_chunk() => self.on_captured(captured),
                event = self.transport.next_event() => match event {
                    Some(event) => {
                        if let Some(reason) = self.dispatch(event) {
                            break reason;
                        }
                    }
                    None => break EndReason::TransportClosed,
                },
                Some(id) = self.playback.next_completion() => self.playback.on_playback_ended(id),
            }
        };

        drop(encoder);
        Ok(self.finish(end_reason).await)
    }

    fn on_captured(&mut self, captured: CapturedChunk) {
        self.volume.send_replace(captured.volume);

        match self.transport.send(captured.chunk) {
            Ok(()) => self.stats.send_modify(|s| s.chunks_sent += 1),
            Err(SessionError::NotConnected) => {
                debug!("Dropping audio chunk: not connected");
                self.stats.send_modify(|s| s.frames_dropped += 1);
            }
            Err(e) => {
                // The terminal event arrives through next_event
                debug!("Dropping audio chunk: {}", e);
                self.stats.send_modify(|s| s.frames_dropped += 1);
            }
        }
    }

    /// Route one server event. Returns why the session must end, if it must.
    fn dispatch(&mut self, event: ServerEvent) -> Option<EndReason> {
        match event {
            ServerEvent::AudioDelta(bytes) => {
                if self.playback.on_audio_delta(&bytes).is_some() {
                    self.stats.send_modify(|s| s.audio_deltas_played += 1);
                }
                self.resume_after_interruption();
            }
            ServerEvent::OutputTextDelta(text) => self.transcript.on_output_text_delta(&text),
            ServerEvent::InputTextDelta(text) => self.transcript.on_input_text_delta(&text),
            ServerEvent::TurnComplete => {
                let committed = self.transcript.on_turn_complete().to_vec();
                if !committed.is_empty() {
                    self.preview.send_modify(|items| items.extend(committed));
                    let count = self.transcript.items().len();
                    self.stats.send_modify(|s| s.transcript_items = count);
                }
                self.resume_after_interruption();
            }
            ServerEvent::Interrupted => {
                self.playback.on_interrupted();
                self.set_state(SessionState::Interrupted);
            }
            ServerEvent::Closed => {
                warn!("Agent closed the connection");
                return Some(EndReason::TransportClosed);
            }
            ServerEvent::Error(reason) => {
                error!("Agent connection error: {}", reason);
                return Some(EndReason::TransportError(reason));
            }
            ServerEvent::Unrecognized(what) => {
                debug!("Ignoring unrecognized server message: {}", what);
            }
        }
        None
    }

    fn resume_after_interruption(&mut self) {
        if *self.state.borrow() == SessionState::Interrupted {
            self.set_state(SessionState::Live);
        }
    }

    /// Teardown after the session went (or was about to go) live
    async fn finish(mut self, reason: EndReason) -> SessionOutcome {
        let failed = reason.is_failure();
        if !failed {
            self.set_state(SessionState::Ending);
        }

        self.release().await;

        // Graceful end keeps the unfinished turn; a dropped connection does not
        let policy = if failed {
            PendingTurnPolicy::Discard
        } else {
            PendingTurnPolicy::Flush
        };
        let transcript = std::mem::take(&mut self.transcript).finish(policy);

        self.set_state(if failed {
            SessionState::Failed
        } else {
            SessionState::Closed
        });
        self.preview.send_replace(transcript.clone());
        let transcript_items = transcript.len();
        self.stats.send_modify(|s| {
            s.transcript_items = transcript_items;
            s.duration_secs = elapsed_secs(s.started_at);
        });

        let mut stats = self.stats.borrow().clone();
        stats.state = *self.state.borrow();

        info!(
            "Session {} finished ({:?}): {} transcript items",
            self.config.session_id,
            reason,
            transcript.len()
        );

        SessionOutcome {
            session_id: self.config.session_id.clone(),
            transcript,
            end_reason: reason,
            stats,
        }
    }

    async fn fail_start(mut self, err: SessionError) -> SessionError {
        self.release().await;
        self.set_state(SessionState::Failed);
        err
    }

    /// Stop capture, close the connection, release audio. Never fails.
    async fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if let Err(e) = self.microphone.stop().await {
            warn!("Ignoring microphone release failure: {:#}", e);
        }
        self.transport.close().await;
        self.playback.close();
        self.volume.send_replace(0.0);

        debug!("Session {} resources released", self.config.session_id);
    }

    fn set_state(&self, next: SessionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            info!(
                "Session {} state: {:?} -> {:?}",
                self.config.session_id, previous, next
            );
        }
        self.stats.send_modify(|s| s.state = next);
    }
}

/// Resolve once an end request arrives (or every handle is gone), applying
/// mute toggles received in the meantime
async fn wait_for_end(commands: &mut mpsc::UnboundedReceiver<SessionCommand>, muted: &mut bool) {
    loop {
        match commands.recv().await {
            Some(SessionCommand::SetMuted(m)) => *muted = m,
            Some(SessionCommand::End) | None => return,
        }
    }
}

fn elapsed_secs(started_at: chrono::DateTime<Utc>) -> f64 {
    Utc::now()
        .signed_duration_since(started_at)
        .num_milliseconds() as f64
        / 1000.0
}
