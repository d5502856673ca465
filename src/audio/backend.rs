use anyhow::Result;
use tokio::sync::mpsc;

use crate::error::CaptureError;

/// A block of captured microphone samples.
///
/// Samples are normalised `f32` in `[-1.0, 1.0]`, interleaved when `channels > 1`.
/// Frames are transient: the capture encoder consumes them and nothing keeps them.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (f32, interleaved)
    pub samples: Vec<f32>,
    /// Native sample rate of the device in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Number of samples per channel
    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    /// Duration covered by this frame, in seconds
    pub fn duration_secs(&self) -> f64 {
        self.frame_count() as f64 / self.sample_rate.max(1) as f64
    }
}

/// Configuration for audio capture
///
/// Frames are delivered at the device's native rate and layout; the encoder
/// owns conversion to the wire format.
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Samples per channel in each captured frame
    pub frame_size: usize,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            frame_size: 4096, // 256ms at 16kHz
        }
    }
}

/// Audio capture backend trait
///
/// Implementations:
/// - cpal microphone (all desktop platforms)
/// - WAV file (batch runs and tests)
#[async_trait::async_trait]
pub trait AudioBackend: Send {
    /// Open the input device and start capturing.
    ///
    /// Returns a channel receiver that will receive audio frames. This is the
    /// microphone permission request: failure means the session cannot start.
    async fn start(&mut self) -> std::result::Result<mpsc::Receiver<AudioFrame>, CaptureError>;

    /// Stop capturing and release the device
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Audio backend factory
pub struct AudioBackendFactory;

impl AudioBackendFactory {
    /// Create audio backend for the requested source
    pub fn create(
        source: AudioSource,
        config: AudioBackendConfig,
    ) -> std::result::Result<Box<dyn AudioBackend>, CaptureError> {
        match source {
            AudioSource::Microphone => {
                let backend = super::microphone::CpalMicrophone::new(config);
                Ok(Box::new(backend))
            }

            AudioSource::File(path) => {
                let backend = super::file::WavFileBackend::new(path, config);
                Ok(Box::new(backend))
            }
        }
    }
}

/// Audio source type
#[derive(Debug, Clone)]
pub enum AudioSource {
    /// Default microphone input
    Microphone,
    /// WAV file played in as if it were a microphone
    File(String),
}
