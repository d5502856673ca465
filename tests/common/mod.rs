// Test doubles for the three session seams: microphone, agent connection,
// and playback output. Each fake comes with a control handle the test keeps
// to drive it and to observe what the session did.

#![allow(dead_code)]

use async_trait::async_trait;
use interview_live::audio::{
    AudioBackend, AudioBuffer, AudioFrame, EncodedAudioChunk, PlaybackId, PlaybackOutput,
};
use interview_live::error::{CaptureError, Result as SessionResult, SessionError};
use interview_live::transport::{AgentSessionConfig, AgentTransport, ServerEvent};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Poll `condition` until it holds, failing the test after ~2s
pub async fn eventually(what: &str, mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {}", what);
}

/// PCM16 silence lasting `secs` at 24kHz
pub fn speech_delta(secs: f64) -> Vec<u8> {
    vec![0u8; (secs * 24000.0).round() as usize * 2]
}

// ============================================================================
// Playback output on a manual clock
// ============================================================================

#[derive(Debug, Default)]
pub struct OutputLog {
    pub now: f64,
    /// (id, start_at, duration)
    pub started: Vec<(PlaybackId, f64, f64)>,
    pub stopped: Vec<PlaybackId>,
    pub closed: u32,
}

pub struct ManualOutput {
    log: Arc<Mutex<OutputLog>>,
    completions: Option<mpsc::UnboundedReceiver<PlaybackId>>,
}

#[derive(Clone)]
pub struct OutputControl {
    pub log: Arc<Mutex<OutputLog>>,
    completions: mpsc::UnboundedSender<PlaybackId>,
}

impl ManualOutput {
    pub fn new() -> (Self, OutputControl) {
        let log = Arc::new(Mutex::new(OutputLog::default()));
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                log: Arc::clone(&log),
                completions: Some(rx),
            },
            OutputControl {
                log,
                completions: tx,
            },
        )
    }
}

impl OutputControl {
    pub fn set_now(&self, now: f64) {
        self.log.lock().unwrap().now = now;
    }

    /// Report a buffer as finished
    pub fn complete(&self, id: PlaybackId) {
        let _ = self.completions.send(id);
    }

    pub fn starts(&self) -> Vec<f64> {
        self.log.lock().unwrap().started.iter().map(|s| s.1).collect()
    }

    pub fn stopped(&self) -> Vec<PlaybackId> {
        self.log.lock().unwrap().stopped.clone()
    }

    pub fn closed(&self) -> u32 {
        self.log.lock().unwrap().closed
    }
}

impl PlaybackOutput for ManualOutput {
    fn now(&self) -> f64 {
        self.log.lock().unwrap().now
    }

    fn start(&mut self, id: PlaybackId, buffer: AudioBuffer, at: f64) -> anyhow::Result<()> {
        let duration = buffer.duration_secs();
        self.log.lock().unwrap().started.push((id, at, duration));
        Ok(())
    }

    fn stop(&mut self, id: PlaybackId) {
        self.log.lock().unwrap().stopped.push(id);
    }

    fn completions(&mut self) -> mpsc::UnboundedReceiver<PlaybackId> {
        self.completions
            .take()
            .unwrap_or_else(|| mpsc::unbounded_channel().1)
    }

    fn close(&mut self) -> anyhow::Result<()> {
        self.log.lock().unwrap().closed += 1;
        Ok(())
    }
}

// ============================================================================
// Scripted agent connection
// ============================================================================

#[derive(Debug, Clone)]
pub enum ConnectBehavior {
    Succeed,
    Fail(String),
    /// Never resolves
    Hang,
}

#[derive(Debug, Default)]
pub struct TransportLog {
    pub connects: u32,
    pub config: Option<AgentSessionConfig>,
    pub sent: Vec<EncodedAudioChunk>,
    pub closes: u32,
}

pub struct ScriptedTransport {
    behavior: ConnectBehavior,
    open: bool,
    log: Arc<Mutex<TransportLog>>,
    events: mpsc::UnboundedReceiver<ServerEvent>,
}

#[derive(Clone)]
pub struct TransportControl {
    pub log: Arc<Mutex<TransportLog>>,
    events: mpsc::UnboundedSender<ServerEvent>,
}

impl ScriptedTransport {
    pub fn new(behavior: ConnectBehavior) -> (Self, TransportControl) {
        let log = Arc::new(Mutex::new(TransportLog::default()));
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                behavior,
                open: false,
                log: Arc::clone(&log),
                events: rx,
            },
            TransportControl { log, events: tx },
        )
    }
}

impl TransportControl {
    /// Deliver a server event to the session
    pub fn push(&self, event: ServerEvent) {
        let _ = self.events.send(event);
    }

    pub fn sent(&self) -> usize {
        self.log.lock().unwrap().sent.len()
    }

    pub fn connects(&self) -> u32 {
        self.log.lock().unwrap().connects
    }

    pub fn closes(&self) -> u32 {
        self.log.lock().unwrap().closes
    }
}

#[async_trait]
impl AgentTransport for ScriptedTransport {
    async fn connect(&mut self, config: &AgentSessionConfig) -> SessionResult<()> {
        {
            let mut log = self.log.lock().unwrap();
            log.connects += 1;
            log.config = Some(config.clone());
        }
        match self.behavior.clone() {
            ConnectBehavior::Succeed => {
                self.open = true;
                Ok(())
            }
            ConnectBehavior::Fail(reason) => Err(SessionError::Connect(reason)),
            ConnectBehavior::Hang => std::future::pending().await,
        }
    }

    fn send(&mut self, chunk: EncodedAudioChunk) -> SessionResult<()> {
        if !self.open {
            return Err(SessionError::NotConnected);
        }
        self.log.lock().unwrap().sent.push(chunk);
        Ok(())
    }

    async fn next_event(&mut self) -> Option<ServerEvent> {
        if !self.open {
            return None;
        }
        let event = self.events.recv().await?;
        if event.is_terminal() {
            self.open = false;
        }
        Some(event)
    }

    async fn close(&mut self) {
        self.open = false;
        self.log.lock().unwrap().closes += 1;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

// ============================================================================
// Scripted microphone
// ============================================================================

#[derive(Debug, Clone)]
pub enum MicBehavior {
    Grant,
    Deny(CaptureError),
    /// Permission prompt never answered
    Hang,
}

pub struct ScriptedMicrophone {
    behavior: MicBehavior,
    frames: Option<mpsc::Receiver<AudioFrame>>,
    stops: Arc<Mutex<u32>>,
    capturing: bool,
}

#[derive(Clone)]
pub struct MicControl {
    frames: mpsc::Sender<AudioFrame>,
    stops: Arc<Mutex<u32>>,
}

impl ScriptedMicrophone {
    pub fn new(behavior: MicBehavior) -> (Self, MicControl) {
        let (tx, rx) = mpsc::channel(64);
        let stops = Arc::new(Mutex::new(0));
        (
            Self {
                behavior,
                frames: Some(rx),
                stops: Arc::clone(&stops),
                capturing: false,
            },
            MicControl { frames: tx, stops },
        )
    }
}

impl MicControl {
    /// Deliver 10ms of 16kHz mono at `level`
    pub async fn speak(&self, level: f32) {
        let _ = self
            .frames
            .send(AudioFrame {
                samples: vec![level; 160],
                sample_rate: 16000,
                channels: 1,
                timestamp_ms: 0,
            })
            .await;
    }

    pub fn stops(&self) -> u32 {
        *self.stops.lock().unwrap()
    }
}

#[async_trait]
impl AudioBackend for ScriptedMicrophone {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        match self.behavior.clone() {
            MicBehavior::Grant => {
                self.capturing = true;
                self.frames
                    .take()
                    .ok_or_else(|| CaptureError::DeviceUnavailable("already started".into()))
            }
            MicBehavior::Deny(e) => Err(e),
            MicBehavior::Hang => std::future::pending().await,
        }
    }

    async fn stop(&mut self) -> anyhow::Result<()> {
        self.capturing = false;
        *self.stops.lock().unwrap() += 1;
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
