pub mod backend;
pub mod encoder;
pub mod file;
pub mod microphone;
pub mod pcm;
pub mod playback;
pub mod resample;
pub mod speaker;

/// Outbound wire rate: microphone audio is sent as 16kHz PCM16 mono.
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

/// Inbound wire rate: agent speech arrives as 24kHz PCM16 mono.
pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

pub use backend::{AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, AudioSource};
pub use encoder::{CaptureEncoder, CapturedChunk, EncodedAudioChunk, EncoderConfig};
pub use file::{AudioFile, WavFileBackend};
pub use microphone::CpalMicrophone;
pub use playback::{AudioBuffer, PlaybackId, PlaybackOutput, PlaybackScheduler, ScheduledPlayback};
pub use resample::StreamResampler;
pub use speaker::CpalSpeaker;
