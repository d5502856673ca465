use anyhow::{Context, Result};
use hound::{SampleFormat, WavReader};
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame};
use crate::error::CaptureError;

/// A WAV recording loaded into memory as normalised samples
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;

        let spec = reader.spec();
        let samples: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to read audio samples")?,
            SampleFormat::Int => reader
                .into_samples::<i16>()
                .map(|s| s.map(|v| v as f32 / i16::MAX as f32))
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to read audio samples")?,
        };

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Split into fixed-size frames (the last one may be short)
    pub fn frames(&self, frame_size: usize) -> Vec<AudioFrame> {
        let per_frame = frame_size.max(1) * self.channels as usize;
        self.samples
            .chunks(per_frame)
            .enumerate()
            .map(|(i, chunk)| AudioFrame {
                samples: chunk.to_vec(),
                sample_rate: self.sample_rate,
                channels: self.channels,
                timestamp_ms: (i * frame_size) as u64 * 1000 / self.sample_rate as u64,
            })
            .collect()
    }
}

/// Feeds a WAV file in as microphone input, paced at real time.
pub struct WavFileBackend {
    path: String,
    config: AudioBackendConfig,
    task: Option<JoinHandle<()>>,
}

impl WavFileBackend {
    pub fn new(path: String, config: AudioBackendConfig) -> Self {
        Self {
            path,
            config,
            task: None,
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for WavFileBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        if self.task.is_some() {
            return Err(CaptureError::DeviceUnavailable("already capturing".into()));
        }

        let audio = AudioFile::open(&self.path)
            .map_err(|e| CaptureError::DeviceUnavailable(format!("{:#}", e)))?;
        let frames = audio.frames(self.config.frame_size);
        let (tx, rx) = mpsc::channel(16);

        let task = tokio::spawn(async move {
            for frame in frames {
                let pace = Duration::from_secs_f64(frame.duration_secs());
                if tx.send(frame).await.is_err() {
                    break;
                }
                tokio::time::sleep(pace).await;
            }
            info!("Audio file exhausted");
        });

        self.task = Some(task);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn name(&self) -> &str {
        "WAV file"
    }
}
