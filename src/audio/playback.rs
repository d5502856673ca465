//! Gapless scheduling of inbound agent speech.
//!
//! Each decoded delta is placed at `max(cursor, now)` on the playback clock and
//! the cursor advances by the buffer's duration, so bursts of deltas play back
//! to back without gaps or overlap. The set of scheduled-but-unfinished buffers
//! is the single source of truth for "the agent is speaking".

use anyhow::Result;
use std::collections::BTreeMap;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::pcm::decode_pcm16_le;
use super::PLAYBACK_SAMPLE_RATE;

/// Identifies one scheduled buffer on a playback output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlaybackId(pub u64);

/// A decoded mono buffer ready to play
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate.max(1) as f64
    }
}

/// Where scheduled buffers are rendered.
///
/// The output owns the playback clock. When a buffer finishes naturally its id
/// is sent on the completion channel handed out by `completions`.
pub trait PlaybackOutput: Send {
    /// Current time on the playback clock, in seconds
    fn now(&self) -> f64;

    /// Start `buffer` at absolute clock time `at`
    fn start(&mut self, id: PlaybackId, buffer: AudioBuffer, at: f64) -> Result<()>;

    /// Silence a buffer immediately, whether or not it has begun
    fn stop(&mut self, id: PlaybackId);

    /// Channel of naturally finished playbacks. Called once, by the scheduler.
    fn completions(&mut self) -> mpsc::UnboundedReceiver<PlaybackId>;

    /// Release the output device
    fn close(&mut self) -> Result<()>;
}

/// A buffer placed on the playback clock
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledPlayback {
    pub id: PlaybackId,
    pub start_at: f64,
    pub duration: f64,
}

impl ScheduledPlayback {
    pub fn end_at(&self) -> f64 {
        self.start_at + self.duration
    }
}

/// Decodes inbound audio deltas and schedules them for gapless playback
pub struct PlaybackScheduler {
    output: Box<dyn PlaybackOutput>,
    completions: mpsc::UnboundedReceiver<PlaybackId>,
    sample_rate: u32,
    cursor: f64,
    active: BTreeMap<PlaybackId, ScheduledPlayback>,
    next_id: u64,
    speaking: watch::Sender<bool>,
    closed: bool,
    played: u64,
    decode_errors: u64,
}

impl PlaybackScheduler {
    pub fn new(output: Box<dyn PlaybackOutput>) -> Self {
        Self::with_sample_rate(output, PLAYBACK_SAMPLE_RATE)
    }

    pub fn with_sample_rate(mut output: Box<dyn PlaybackOutput>, sample_rate: u32) -> Self {
        let completions = output.completions();
        let (speaking, _) = watch::channel(false);

        info!("Playback scheduler initialized: {}Hz PCM16 mono in", sample_rate);

        Self {
            output,
            completions,
            sample_rate,
            cursor: 0.0,
            active: BTreeMap::new(),
            next_id: 0,
            speaking,
            closed: false,
            played: 0,
            decode_errors: 0,
        }
    }

    /// Decode and schedule one inbound delta.
    ///
    /// Malformed deltas are logged and skipped. After `close` every delta is
    /// ignored, so late audio can never reopen playback.
    pub fn on_audio_delta(&mut self, bytes: &[u8]) -> Option<ScheduledPlayback> {
        if self.closed {
            debug!("Dropping audio delta after playback closed");
            return None;
        }

        let samples = match decode_pcm16_le(bytes) {
            Ok(s) => s,
            Err(e) => {
                warn!("Skipping audio delta: {}", e);
                self.decode_errors += 1;
                return None;
            }
        };

        let buffer = AudioBuffer {
            samples,
            sample_rate: self.sample_rate,
        };
        let duration = buffer.duration_secs();
        let start_at = self.cursor.max(self.output.now());
        let id = PlaybackId(self.next_id);
        self.next_id += 1;

        if let Err(e) = self.output.start(id, buffer, start_at) {
            warn!("Failed to start playback {:?}: {:#}", id, e);
            return None;
        }

        self.cursor = start_at + duration;
        let scheduled = ScheduledPlayback {
            id,
            start_at,
            duration,
        };
        self.active.insert(id, scheduled);
        self.played += 1;
        self.publish_speaking();

        debug!(
            "Scheduled {:?} at {:.3}s for {:.3}s (cursor {:.3}s)",
            id, start_at, duration, self.cursor
        );

        Some(scheduled)
    }

    /// Barge-in: silence everything queued and restart the cursor at "now"
    pub fn on_interrupted(&mut self) {
        let stopped = self.active.len();
        for id in std::mem::take(&mut self.active).into_keys() {
            self.output.stop(id);
        }
        self.cursor = self.output.now();
        self.publish_speaking();

        info!("Playback interrupted: {} buffers stopped", stopped);
    }

    /// A buffer finished on its own
    pub fn on_playback_ended(&mut self, id: PlaybackId) {
        if self.active.remove(&id).is_some() {
            self.publish_speaking();
        }
    }

    /// Wait for the next natural completion from the output
    pub async fn next_completion(&mut self) -> Option<PlaybackId> {
        self.completions.recv().await
    }

    /// True while any scheduled buffer has not finished
    pub fn is_speaking(&self) -> bool {
        !self.active.is_empty()
    }

    /// Speaking-state transitions, emitted whenever the active set becomes
    /// empty or non-empty
    pub fn subscribe_speaking(&self) -> watch::Receiver<bool> {
        self.speaking.subscribe()
    }

    pub fn active(&self) -> impl Iterator<Item = &ScheduledPlayback> {
        self.active.values()
    }

    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    /// Deltas successfully scheduled so far
    pub fn played(&self) -> u64 {
        self.played
    }

    pub fn decode_errors(&self) -> u64 {
        self.decode_errors
    }

    /// Stop everything and release the output. Never fails.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        for id in std::mem::take(&mut self.active).into_keys() {
            self.output.stop(id);
        }
        self.publish_speaking();

        if let Err(e) = self.output.close() {
            warn!("Ignoring playback close failure: {:#}", e);
        }
        info!("Playback closed");
    }

    fn publish_speaking(&self) {
        let speaking = !self.active.is_empty();
        self.speaking.send_if_modified(|current| {
            if *current != speaking {
                *current = speaking;
                true
            } else {
                false
            }
        });
    }
}

impl Drop for PlaybackScheduler {
    fn drop(&mut self) {
        self.close();
    }
}
