//! Speaker output using cpal
//
// Scheduled buffers are mixed at the wire rate by summing every voice that
// overlaps the current frame, clipped to [-1, 1]. The mixed stream is then
// resampled to the device rate as one continuous signal, so back-to-back
// buffers meet on an exact frame boundary. The playback clock is the number
// of mix frames rendered.

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use std::collections::VecDeque;
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::playback::{AudioBuffer, PlaybackId, PlaybackOutput};
use super::resample::StreamResampler;

struct Voice {
    id: PlaybackId,
    start_frame: u64,
    samples: Vec<f32>,
}

impl Voice {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

/// State shared between the session and the device callback
struct MixState {
    voices: Vec<Voice>,
    frames_rendered: u64,
    completions: Option<mpsc::UnboundedSender<PlaybackId>>,
}

impl MixState {
    /// Render `frames` mono frames into `out`, then retire finished voices
    fn render(&mut self, out: &mut [f32]) {
        for (i, slot) in out.iter_mut().enumerate() {
            let frame = self.frames_rendered + i as u64;
            let mut sum = 0.0f32;
            for voice in &self.voices {
                if frame >= voice.start_frame && frame < voice.end_frame() {
                    sum += voice.samples[(frame - voice.start_frame) as usize];
                }
            }
            *slot = sum.clamp(-1.0, 1.0);
        }
        self.frames_rendered += out.len() as u64;

        let now = self.frames_rendered;
        let completions = &self.completions;
        self.voices.retain(|voice| {
            if voice.end_frame() <= now {
                if let Some(tx) = completions {
                    let _ = tx.send(voice.id);
                }
                false
            } else {
                true
            }
        });
    }
}

/// Mix frame at which a buffer scheduled for `at` seconds starts
fn frame_at(at: f64, rate: u32) -> u64 {
    (at.max(0.0) * rate as f64).round() as u64
}

/// Pulls mix frames on demand and converts them to the device rate.
struct DeviceRenderer {
    resampler: StreamResampler,
    scratch: Vec<f32>,
    converted: Vec<f32>,
    ready: VecDeque<f32>,
}

impl DeviceRenderer {
    fn new(mix_rate: u32, device_rate: u32) -> Result<Self> {
        Ok(Self {
            resampler: StreamResampler::new(mix_rate, device_rate)?,
            scratch: Vec::new(),
            converted: Vec::new(),
            ready: VecDeque::new(),
        })
    }

    /// Fill `out` with device-rate mono frames
    fn fill(&mut self, shared: &Mutex<MixState>, out: &mut [f32]) {
        if self.resampler.is_passthrough() {
            match shared.lock() {
                Ok(mut state) => state.render(out),
                Err(_) => out.fill(0.0),
            }
            return;
        }

        while self.ready.len() < out.len() {
            self.scratch.resize(self.resampler.input_chunk(), 0.0);
            match shared.lock() {
                Ok(mut state) => state.render(&mut self.scratch),
                Err(_) => self.scratch.fill(0.0),
            }
            self.converted.clear();
            if self
                .resampler
                .process_into(&self.scratch, &mut self.converted)
                .is_err()
            {
                break;
            }
            self.ready.extend(self.converted.iter().copied());
        }

        for slot in out.iter_mut() {
            *slot = self.ready.pop_front().unwrap_or(0.0);
        }
    }
}

/// Default output device driven by a sample-counting clock.
pub struct CpalSpeaker {
    state: Arc<Mutex<MixState>>,
    mix_rate: u32,
    stop_tx: Option<std_mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CpalSpeaker {
    /// Open the default output device, mixing buffers at `mix_rate`.
    ///
    /// Blocks until the device thread reports the stream is running.
    pub fn open(mix_rate: u32) -> Result<Self> {
        let state = Arc::new(Mutex::new(MixState {
            voices: Vec::new(),
            frames_rendered: 0,
            completions: None,
        }));

        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<u32, String>>();
        let shared = Arc::clone(&state);

        let thread = std::thread::spawn(move || {
            let host = cpal::default_host();
            let Some(device) = host.default_output_device() else {
                let _ = ready_tx.send(Err("no output device".into()));
                return;
            };
            let supported = match device.default_output_config() {
                Ok(c) => c,
                Err(e) => {
                    let _ = ready_tx.send(Err(e.to_string()));
                    return;
                }
            };
            let sample_format = supported.sample_format();
            let config: StreamConfig = supported.config();
            let channels = config.channels as usize;
            let renderer = match DeviceRenderer::new(mix_rate, config.sample_rate.0) {
                Ok(r) => r,
                Err(e) => {
                    let _ = ready_tx.send(Err(format!("{:#}", e)));
                    return;
                }
            };

            macro_rules! output_stream {
                ($sample_type:ty, $converter:expr) => {{
                    let shared = Arc::clone(&shared);
                    let mut renderer = renderer;
                    let mut mono = Vec::new();
                    device.build_output_stream(
                        &config,
                        move |data: &mut [$sample_type], _: &cpal::OutputCallbackInfo| {
                            mono.resize(data.len() / channels, 0.0f32);
                            renderer.fill(&shared, &mut mono);
                            for (frame, &value) in data.chunks_mut(channels).zip(&mono) {
                                for sample in frame {
                                    *sample = $converter(value);
                                }
                            }
                        },
                        |err| error!("Speaker stream error: {}", err),
                        None,
                    )
                }};
            }

            let stream = match sample_format {
                SampleFormat::F32 => output_stream!(f32, |v: f32| v),
                SampleFormat::I16 => output_stream!(i16, |v: f32| (v * i16::MAX as f32) as i16),
                SampleFormat::U16 => output_stream!(u16, |v: f32| {
                    ((v + 1.0) * 0.5 * u16::MAX as f32) as u16
                }),
                other => {
                    let _ = ready_tx.send(Err(format!("unsupported sample format: {:?}", other)));
                    return;
                }
            };

            let stream = match stream {
                Ok(s) => s,
                Err(e) => {
                    let _ = ready_tx.send(Err(e.to_string()));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(e.to_string()));
                return;
            }

            let _ = ready_tx.send(Ok(config.sample_rate.0));
            let _ = stop_rx.recv();
            debug!("Speaker thread releasing stream");
        });

        let device_rate = ready_rx
            .recv()
            .context("Speaker thread exited before start")?
            .map_err(|e| anyhow!("Failed to open speaker: {}", e))?;

        info!("Speaker opened at {}Hz, mixing at {}Hz", device_rate, mix_rate);

        Ok(Self {
            state,
            mix_rate,
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }
}

impl PlaybackOutput for CpalSpeaker {
    fn now(&self) -> f64 {
        match self.state.lock() {
            Ok(state) => state.frames_rendered as f64 / self.mix_rate as f64,
            Err(_) => 0.0,
        }
    }

    fn start(&mut self, id: PlaybackId, buffer: AudioBuffer, at: f64) -> Result<()> {
        if buffer.sample_rate != self.mix_rate {
            return Err(anyhow!(
                "buffer at {}Hz does not match the {}Hz mix",
                buffer.sample_rate,
                self.mix_rate
            ));
        }
        let start_frame = frame_at(at, self.mix_rate);

        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow!("speaker state poisoned"))?;
        state.voices.push(Voice {
            id,
            start_frame,
            samples: buffer.samples,
        });
        Ok(())
    }

    fn stop(&mut self, id: PlaybackId) {
        if let Ok(mut state) = self.state.lock() {
            state.voices.retain(|v| v.id != id);
        }
    }

    fn completions(&mut self) -> mpsc::UnboundedReceiver<PlaybackId> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut state) = self.state.lock() {
            state.completions = Some(tx);
        }
        rx
    }

    fn close(&mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            thread
                .join()
                .map_err(|_| anyhow!("speaker thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for CpalSpeaker {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Speaker release failed: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(voices: Vec<Voice>) -> (MixState, mpsc::UnboundedReceiver<PlaybackId>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            MixState {
                voices,
                frames_rendered: 0,
                completions: Some(tx),
            },
            rx,
        )
    }

    #[test]
    fn test_render_back_to_back_voices() {
        let (mut state, mut rx) = state_with(vec![
            Voice {
                id: PlaybackId(0),
                start_frame: 0,
                samples: vec![0.1, 0.1],
            },
            Voice {
                id: PlaybackId(1),
                start_frame: 2,
                samples: vec![0.2, 0.2],
            },
        ]);

        let mut out = vec![0.0; 3];
        state.render(&mut out);
        assert_eq!(out, vec![0.1, 0.1, 0.2]);
        assert_eq!(rx.try_recv().unwrap(), PlaybackId(0));
        assert!(rx.try_recv().is_err());

        state.render(&mut out);
        assert_eq!(out, vec![0.2, 0.0, 0.0]);
        assert_eq!(rx.try_recv().unwrap(), PlaybackId(1));
        assert!(state.voices.is_empty());
    }

    #[test]
    fn test_render_clips_overlap() {
        let (mut state, _rx) = state_with(vec![
            Voice {
                id: PlaybackId(0),
                start_frame: 0,
                samples: vec![0.8],
            },
            Voice {
                id: PlaybackId(1),
                start_frame: 0,
                samples: vec![0.8],
            },
        ]);

        let mut out = vec![0.0; 1];
        state.render(&mut out);
        assert_eq!(out, vec![1.0]);
    }

    #[test]
    fn test_back_to_back_buffers_leave_no_gap() {
        // Two 50ms buffers at the 24kHz mix rate, the second scheduled at the
        // first's end time as the playback cursor reports it
        let first_at = 0.0;
        let second_at = first_at + 1200.0 / 24000.0;
        let (state, _rx) = state_with(vec![
            Voice {
                id: PlaybackId(0),
                start_frame: frame_at(first_at, 24000),
                samples: vec![0.5; 1200],
            },
            Voice {
                id: PlaybackId(1),
                start_frame: frame_at(second_at, 24000),
                samples: vec![0.5; 1200],
            },
        ]);
        assert_eq!(state.voices[1].start_frame, 1200);

        // Rendered at a 48kHz device in callback-sized pieces
        let shared = Mutex::new(state);
        let mut renderer = DeviceRenderer::new(24000, 48000).unwrap();
        let mut device = Vec::new();
        let mut block = vec![0.0; 441];
        while device.len() < 6000 {
            renderer.fill(&shared, &mut block);
            device.extend_from_slice(&block);
        }

        // Past the resampler's start-up, the join between the buffers is flat
        let steady = &device[1500..4000];
        let lowest = steady.iter().copied().fold(f32::MAX, f32::min);
        assert!(lowest > 0.45, "dip to {} between buffers", lowest);
        assert!(shared.lock().unwrap().frames_rendered >= 2400);
    }

    #[test]
    fn test_renderer_passthrough_at_mix_rate() {
        let (state, mut rx) = state_with(vec![Voice {
            id: PlaybackId(7),
            start_frame: 0,
            samples: vec![0.25; 4],
        }]);
        let shared = Mutex::new(state);
        let mut renderer = DeviceRenderer::new(24000, 24000).unwrap();

        let mut out = vec![0.0; 6];
        renderer.fill(&shared, &mut out);
        assert_eq!(out, vec![0.25, 0.25, 0.25, 0.25, 0.0, 0.0]);
        assert_eq!(rx.try_recv().unwrap(), PlaybackId(7));
    }

    #[test]
    fn test_frame_at_rounds_to_nearest_frame() {
        assert_eq!(frame_at(0.05, 24000), 1200);
        assert_eq!(frame_at(0.1 + 0.05, 24000), 3600);
        assert_eq!(frame_at(-0.01, 24000), 0);
    }
}
