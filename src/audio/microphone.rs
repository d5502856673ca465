//! Microphone capture using cpal

use anyhow::Result;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, StreamConfig};
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame};
use crate::error::CaptureError;

/// Slices the device callback's variable-size buffers into fixed-size frames.
struct FrameAssembler {
    pending: Vec<f32>,
    samples_per_frame: usize,
    sample_rate: u32,
    channels: u16,
    emitted: u64,
    tx: mpsc::Sender<AudioFrame>,
}

impl FrameAssembler {
    fn push(&mut self, data: impl Iterator<Item = f32>) {
        self.pending.extend(data);

        while self.pending.len() >= self.samples_per_frame {
            let rest = self.pending.split_off(self.samples_per_frame);
            let samples = std::mem::replace(&mut self.pending, rest);
            let per_channel = (samples.len() / self.channels as usize) as u64;

            let frame = AudioFrame {
                samples,
                sample_rate: self.sample_rate,
                channels: self.channels,
                timestamp_ms: self.emitted * 1000 / self.sample_rate as u64,
            };
            self.emitted += per_channel;

            // The device callback must never block
            if let Err(e) = self.tx.try_send(frame) {
                warn!("Microphone frame dropped: {}", e);
            }
        }
    }
}

fn build_and_run_stream<T, F>(
    device: &Device,
    config: &StreamConfig,
    mut assembler: FrameAssembler,
    convert_fn: F,
) -> Result<cpal::Stream, CaptureError>
where
    T: cpal::SizedSample + Send + 'static,
    F: Fn(T) -> f32 + Send + 'static,
{
    let stream = device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                assembler.push(data.iter().map(|&s| convert_fn(s)));
            },
            |err| error!("Microphone stream error: {}", err),
            None,
        )
        .map_err(|e| classify(e.to_string()))?;

    stream.play().map_err(|e| classify(e.to_string()))?;
    Ok(stream)
}

/// Map a cpal failure description onto the capture taxonomy
fn classify(message: String) -> CaptureError {
    if message.to_lowercase().contains("permission") {
        CaptureError::PermissionDenied
    } else {
        CaptureError::DeviceUnavailable(message)
    }
}

/// Handle to control the capture thread lifecycle.
/// When dropped, signals the thread to release the stream.
struct StreamHandle {
    stop_tx: std_mpsc::Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl StreamHandle {
    fn shutdown(mut self) {
        let _ = self.stop_tx.send(());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Microphone thread panicked during shutdown");
            }
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
    }
}

/// Default input device, opened on a dedicated thread.
///
/// `cpal::Stream` is `!Send`, so the stream lives on its own thread and is
/// dropped there when the handle is shut down or dropped.
pub struct CpalMicrophone {
    config: AudioBackendConfig,
    handle: Option<StreamHandle>,
}

impl CpalMicrophone {
    pub fn new(config: AudioBackendConfig) -> Self {
        Self {
            config,
            handle: None,
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for CpalMicrophone {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        if self.handle.is_some() {
            return Err(CaptureError::DeviceUnavailable("already capturing".into()));
        }

        info!("Requesting microphone");

        let (frame_tx, frame_rx) = mpsc::channel(64);
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel::<Result<(), CaptureError>>();
        let frame_size = self.config.frame_size;

        let thread = std::thread::spawn(move || {
            let host = cpal::default_host();
            let device = match host.default_input_device() {
                Some(d) => d,
                None => {
                    let _ = ready_tx.send(Err(CaptureError::DeviceUnavailable(
                        "no input device".into(),
                    )));
                    return;
                }
            };

            let supported = match device.default_input_config() {
                Ok(c) => c,
                Err(e) => {
                    let _ = ready_tx.send(Err(classify(e.to_string())));
                    return;
                }
            };

            let sample_format = supported.sample_format();
            let config: StreamConfig = supported.config();
            debug!(
                "Microphone config: {}Hz, {} channels, {:?}",
                config.sample_rate.0, config.channels, sample_format
            );

            let assembler = FrameAssembler {
                pending: Vec::new(),
                samples_per_frame: frame_size * config.channels as usize,
                sample_rate: config.sample_rate.0,
                channels: config.channels,
                emitted: 0,
                tx: frame_tx,
            };

            macro_rules! handle_format {
                ($sample_type:ty, $converter:expr) => {
                    build_and_run_stream::<$sample_type, _>(&device, &config, assembler, $converter)
                };
            }

            let stream_result = match sample_format {
                SampleFormat::I16 => handle_format!(i16, |s| f32::from(s) / i16::MAX as f32),
                SampleFormat::I32 => handle_format!(i32, |s| s as f32 / i32::MAX as f32),
                SampleFormat::U16 => handle_format!(u16, |s| {
                    (f32::from(s) - (1u16 << 15) as f32) / ((1u16 << 15) - 1) as f32
                }),
                SampleFormat::F32 => handle_format!(f32, |s| s),
                SampleFormat::F64 => handle_format!(f64, |s| s as f32),
                other => Err(CaptureError::DeviceUnavailable(format!(
                    "unsupported sample format: {:?}",
                    other
                ))),
            };

            let _stream = match stream_result {
                Ok(s) => {
                    let _ = ready_tx.send(Ok(()));
                    s
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            // Keep the stream alive until asked to release it
            let _ = stop_rx.recv();
            debug!("Microphone thread releasing stream");
        });

        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(CaptureError::DeviceUnavailable(
                    "microphone thread exited before start".into(),
                ))
            }
        }

        self.handle = Some(StreamHandle {
            stop_tx,
            thread: Some(thread),
        });

        info!("Microphone capture started");
        Ok(frame_rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(handle) = self.handle.take() {
            tokio::task::spawn_blocking(move || handle.shutdown()).await?;
            info!("Microphone released");
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.handle.is_some()
    }

    fn name(&self) -> &str {
        "cpal microphone"
    }
}
