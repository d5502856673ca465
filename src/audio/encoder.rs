use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::backend::AudioFrame;
use super::pcm::{downmix_to_mono, encode_pcm16_le, rms_volume};
use super::resample::StreamResampler;
use super::CAPTURE_SAMPLE_RATE;

/// Little-endian 16-bit mono PCM derived from one captured frame.
///
/// Ownership moves to the transport on send; nothing keeps it afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAudioChunk {
    /// Capture-order sequence number
    pub sequence: u64,
    /// PCM16 LE bytes at `sample_rate`
    pub pcm: Vec<u8>,
    /// Wire sample rate in Hz
    pub sample_rate: u32,
    /// Capture timestamp of the source frame
    pub timestamp_ms: u64,
}

/// An encoded chunk paired with its speaking-volume estimate.
///
/// The volume is a side channel for the UI and never goes on the wire.
#[derive(Debug, Clone)]
pub struct CapturedChunk {
    pub chunk: EncodedAudioChunk,
    pub volume: f32,
}

/// Encoder settings
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// Outbound wire sample rate
    pub target_sample_rate: u32,
    /// Multiplier applied to the RMS before clamping to `[0, 1]`
    pub volume_gain: f32,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: CAPTURE_SAMPLE_RATE,
            volume_gain: 8.0,
        }
    }
}

/// Turns raw microphone frames into outbound wire chunks.
pub struct CaptureEncoder {
    frames: mpsc::Receiver<AudioFrame>,
    config: EncoderConfig,
    resampler: Option<StreamResampler>,
    muted: bool,
    sequence: u64,
    frames_muted: u64,
}

impl CaptureEncoder {
    pub fn new(frames: mpsc::Receiver<AudioFrame>, config: EncoderConfig) -> Self {
        info!(
            "Capture encoder initialized: {}Hz PCM16 mono out",
            config.target_sample_rate
        );

        Self {
            frames,
            config,
            resampler: None,
            muted: false,
            sequence: 0,
            frames_muted: 0,
        }
    }

    pub fn set_muted(&mut self, muted: bool) {
        if self.muted != muted {
            info!("Microphone {}", if muted { "muted" } else { "unmuted" });
        }
        self.muted = muted;
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Frames consumed while muted
    pub fn frames_muted(&self) -> u64 {
        self.frames_muted
    }

    /// Next encoded chunk, skipping muted frames.
    ///
    /// Returns `None` once the capture device has stopped delivering frames.
    pub async fn next_chunk(&mut self) -> Option<CapturedChunk> {
        loop {
            let frame = self.frames.recv().await?;
            if let Some(chunk) = self.encode_frame(frame) {
                return Some(chunk);
            }
        }
    }

    /// Encode one frame. Muted frames still advance the resampler so timing
    /// stays continuous, but produce nothing. A frame that only fills the
    /// resampler's input buffer also produces nothing.
    pub fn encode_frame(&mut self, frame: AudioFrame) -> Option<CapturedChunk> {
        let mono = downmix_to_mono(&frame.samples, frame.channels);

        let target = self.config.target_sample_rate;
        if self.resampler.as_ref().map(|r| r.from_rate()) != Some(frame.sample_rate) {
            debug!("Resampling capture {}Hz -> {}Hz", frame.sample_rate, target);
            self.resampler = match StreamResampler::new(frame.sample_rate, target) {
                Ok(r) => Some(r),
                Err(e) => {
                    warn!("Dropping capture frame: {:#}", e);
                    return None;
                }
            };
        }
        let samples = match self.resampler.as_mut().map(|r| r.process(&mono)) {
            Some(Ok(samples)) => samples,
            Some(Err(e)) => {
                warn!("Dropping capture frame: {:#}", e);
                return None;
            }
            None => return None,
        };

        if self.muted {
            self.frames_muted += 1;
            return None;
        }
        if samples.is_empty() {
            return None;
        }

        let volume = rms_volume(&mono, self.config.volume_gain);
        let chunk = EncodedAudioChunk {
            sequence: self.sequence,
            pcm: encode_pcm16_le(&samples),
            sample_rate: target,
            timestamp_ms: frame.timestamp_ms,
        };
        self.sequence += 1;

        Some(CapturedChunk { chunk, volume })
    }
}
