use anyhow::{Context, Result};
use serde::Deserialize;

use crate::audio::{
    AudioBackendFactory, AudioSource, CpalSpeaker, CAPTURE_SAMPLE_RATE, PLAYBACK_SAMPLE_RATE,
};
use crate::session::{InterviewContext, InterviewSession, SessionConfig, SessionHandle};
use crate::transport::{StreamingTransportClient, TransportConfig};

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub agent: AgentConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Websocket endpoint of the live agent
    pub url: String,
    pub model: String,
    pub voice: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    pub capture_sample_rate: u32,
    pub playback_sample_rate: u32,
    pub frame_size: usize,
    pub volume_gain: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            capture_sample_rate: CAPTURE_SAMPLE_RATE,
            playback_sample_rate: PLAYBACK_SAMPLE_RATE,
            frame_size: 4096,
            volume_gain: 8.0,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    pub transcripts_path: String,
}

impl Config {
    /// Load `path` (any format the `config` crate detects), with
    /// `INTERVIEW__SECTION__KEY` environment overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("INTERVIEW").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            url: self.agent.url.clone(),
            api_key: std::env::var(&self.agent.api_key_env).ok(),
        }
    }

    /// Session settings for a new interview about `context`
    pub fn session(&self, context: InterviewContext, voice: Option<String>) -> SessionConfig {
        SessionConfig {
            context,
            model: self.agent.model.clone(),
            voice: voice.unwrap_or_else(|| self.agent.voice.clone()),
            capture_sample_rate: self.audio.capture_sample_rate,
            playback_sample_rate: self.audio.playback_sample_rate,
            frame_size: self.audio.frame_size,
            volume_gain: self.audio.volume_gain,
            ..SessionConfig::default()
        }
    }

    /// Wire a session to the default speaker, the configured agent endpoint
    /// and `source`. Nothing is opened on the input side until the session runs.
    pub async fn open_session(
        &self,
        session: SessionConfig,
        source: AudioSource,
    ) -> Result<(InterviewSession, SessionHandle)> {
        let microphone = AudioBackendFactory::create(source, session.backend())?;
        let mix_rate = session.playback_sample_rate;
        let speaker = open_off_runtime(move || CpalSpeaker::open(mix_rate)).await?;
        let transport = StreamingTransportClient::new(self.transport());

        Ok(InterviewSession::new(
            session,
            microphone,
            Box::new(transport),
            Box::new(speaker),
        ))
    }

    /// Output directory with `~` expanded
    pub fn transcripts_dir(&self) -> String {
        shellexpand::tilde(&self.output.transcripts_path).into_owned()
    }
}

/// Run a blocking device open on the blocking pool so async callers keep
/// serving other tasks while the device thread starts
pub async fn open_off_runtime<T, F>(open: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(open)
        .await
        .context("Device open task failed")?
}
