use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream, StreamExt};
use futures::SinkExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::event::ServerEvent;
use super::messages::{
    decode_server_message, truncate_for_log, Inbound, RealtimeInputMessage, SetupMessage,
};
use crate::audio::EncodedAudioChunk;
use crate::error::{Result, SessionError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// What the remote agent is asked to be
#[derive(Debug, Clone)]
pub struct AgentSessionConfig {
    /// Model identifier sent in the handshake
    pub model: String,
    /// Prebuilt voice name
    pub voice: String,
    /// Persona instructions, interview context included
    pub instructions: String,
}

/// Duplex connection to the remote agent.
///
/// Implementations must deliver events in arrival order and stop emitting
/// after the first terminal event (`Closed` / `Error`). They never reconnect.
#[async_trait]
pub trait AgentTransport: Send {
    /// Open the connection and complete the handshake
    async fn connect(&mut self, config: &AgentSessionConfig) -> Result<()>;

    /// Queue one chunk for sending. Fire-and-forget, order-preserving.
    /// Fails with `NotConnected` before `connect` completes.
    fn send(&mut self, chunk: EncodedAudioChunk) -> Result<()>;

    /// Next inbound event; `None` once the connection is terminal
    async fn next_event(&mut self) -> Option<ServerEvent>;

    /// Close the connection. Never fails.
    async fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closed,
}

/// Endpoint settings
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Websocket endpoint
    pub url: String,
    /// API key appended as the `key` query parameter, if set
    pub api_key: Option<String>,
}

/// Websocket client for the streaming agent protocol
pub struct StreamingTransportClient {
    config: TransportConfig,
    state: ConnectionState,
    write_tx: Option<mpsc::UnboundedSender<Message>>,
    event_rx: Option<mpsc::Receiver<ServerEvent>>,
    read_handle: Option<JoinHandle<()>>,
    write_handle: Option<JoinHandle<()>>,
}

impl StreamingTransportClient {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            state: ConnectionState::Idle,
            write_tx: None,
            event_rx: None,
            read_handle: None,
            write_handle: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    fn endpoint(&self) -> String {
        match &self.config.api_key {
            Some(key) => {
                let sep = if self.config.url.contains('?') { '&' } else { '?' };
                format!("{}{}key={}", self.config.url, sep, key)
            }
            None => self.config.url.clone(),
        }
    }

    fn mark_closed(&mut self) {
        self.state = ConnectionState::Closed;
        self.write_tx = None;
        self.event_rx = None;
    }
}

#[async_trait]
impl AgentTransport for StreamingTransportClient {
    async fn connect(&mut self, config: &AgentSessionConfig) -> Result<()> {
        if self.state != ConnectionState::Idle {
            return Err(SessionError::Connect(
                "connection already used for this session".into(),
            ));
        }
        self.state = ConnectionState::Connecting;

        info!("Connecting to agent at {}", self.config.url);

        let (ws, _response) = connect_async(self.endpoint()).await.map_err(|e| {
            self.state = ConnectionState::Closed;
            SessionError::Connect(format!("failed to connect: {}", e))
        })?;
        let (mut write, mut read) = ws.split();

        let setup = SetupMessage::new(&config.model, &config.voice, &config.instructions);
        let payload = serde_json::to_string(&setup)
            .map_err(|e| SessionError::Connect(format!("failed to encode setup: {}", e)))?;
        if let Err(e) = write.send(Message::Text(payload)).await {
            self.state = ConnectionState::Closed;
            return Err(SessionError::Connect(format!("failed to send setup: {}", e)));
        }

        if let Err(e) = await_setup_complete(&mut read).await {
            self.state = ConnectionState::Closed;
            let _ = write.close().await;
            return Err(e);
        }

        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(100);

        self.write_handle = Some(tokio::spawn(write_loop(write, write_rx)));
        self.read_handle = Some(tokio::spawn(read_loop(read, event_tx)));
        self.write_tx = Some(write_tx);
        self.event_rx = Some(event_rx);
        self.state = ConnectionState::Open;

        info!("Agent connection open (voice: {})", config.voice);
        Ok(())
    }

    fn send(&mut self, chunk: EncodedAudioChunk) -> Result<()> {
        if self.state != ConnectionState::Open {
            return Err(SessionError::NotConnected);
        }
        let Some(write_tx) = &self.write_tx else {
            return Err(SessionError::NotConnected);
        };

        let message = RealtimeInputMessage::from_chunk(&chunk);
        let payload = serde_json::to_string(&message)
            .map_err(|e| SessionError::Transport(format!("failed to encode audio: {}", e)))?;

        write_tx
            .send(Message::Text(payload))
            .map_err(|_| SessionError::Closed)
    }

    async fn next_event(&mut self) -> Option<ServerEvent> {
        let event_rx = self.event_rx.as_mut()?;

        // A reader that vanished without a terminal event still ends the stream
        let event = event_rx.recv().await.unwrap_or(ServerEvent::Closed);
        if event.is_terminal() {
            debug!("Agent connection terminal: {}", event.kind());
            self.mark_closed();
        }
        Some(event)
    }

    async fn close(&mut self) {
        if let Some(write_tx) = self.write_tx.take() {
            let _ = write_tx.send(Message::Close(None));
        }
        if let Some(handle) = self.write_handle.take() {
            if let Err(e) = handle.await {
                warn!("Writer task ended abnormally: {}", e);
            }
        }
        if let Some(handle) = self.read_handle.take() {
            handle.abort();
        }
        if self.state != ConnectionState::Closed {
            info!("Agent connection closed");
        }
        self.mark_closed();
    }

    fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }
}

impl Drop for StreamingTransportClient {
    fn drop(&mut self) {
        if let Some(handle) = self.read_handle.take() {
            handle.abort();
        }
        if let Some(handle) = self.write_handle.take() {
            handle.abort();
        }
    }
}

async fn await_setup_complete(read: &mut SplitStream<WsStream>) -> Result<()> {
    while let Some(result) = read.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if let Some(outcome) = handshake_step(decode_server_message(&text)) {
                    return outcome;
                }
            }
            Ok(Message::Binary(bytes)) => {
                if let Ok(text) = std::str::from_utf8(&bytes) {
                    if let Some(outcome) = handshake_step(decode_server_message(text)) {
                        return outcome;
                    }
                }
            }
            Ok(Message::Close(frame)) => {
                let reason = frame
                    .map(|f| format!("{}: {}", u16::from(f.code), f.reason))
                    .unwrap_or_else(|| "closed during handshake".into());
                return Err(SessionError::Connect(format!(
                    "agent rejected session ({})",
                    reason
                )));
            }
            Ok(_) => {}
            Err(e) => return Err(SessionError::Connect(format!("handshake failed: {}", e))),
        }
    }
    Err(SessionError::Connect("connection ended during handshake".into()))
}

/// Outcome of one inbound message while waiting for `setupComplete`.
///
/// An error reported by the agent fails the handshake at once; other events
/// before the acknowledgement are dropped.
fn handshake_step(inbound: Inbound) -> Option<Result<()>> {
    match inbound {
        Inbound::SetupComplete => Some(Ok(())),
        Inbound::Events(events) => {
            let rejected = events.into_iter().find_map(|event| match event {
                ServerEvent::Error(reason) => Some(reason),
                _ => None,
            });
            match rejected {
                Some(reason) => Some(Err(SessionError::Connect(format!(
                    "agent rejected session ({})",
                    reason
                )))),
                None => {
                    debug!("Ignoring events before setup completed");
                    None
                }
            }
        }
    }
}

// Write loop task
async fn write_loop(
    mut write: SplitSink<WsStream, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        if let Message::Close(_) = msg {
            let _ = write.close().await;
            break;
        }
        if let Err(e) = write.send(msg).await {
            error!("Write error: {}", e);
            break;
        }
    }
}

// Read loop task
async fn read_loop(mut read: SplitStream<WsStream>, tx: mpsc::Sender<ServerEvent>) {
    while let Some(result) = read.next().await {
        let events = match result {
            Ok(Message::Text(text)) => {
                debug!("Received: {}", truncate_for_log(&text, 200));
                inbound_events(decode_server_message(&text))
            }
            // Some deployments send JSON in binary frames
            Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => inbound_events(decode_server_message(text)),
                Err(_) => vec![ServerEvent::Unrecognized(format!(
                    "{} byte binary frame",
                    bytes.len()
                ))],
            },
            Ok(Message::Close(frame)) => {
                let event = match frame {
                    Some(f) if f.code != CloseCode::Normal => {
                        ServerEvent::Error(format!("{}: {}", u16::from(f.code), f.reason))
                    }
                    _ => ServerEvent::Closed,
                };
                let _ = tx.send(event).await;
                return;
            }
            Ok(_) => continue,
            Err(e) => {
                error!("Read error: {}", e);
                let _ = tx.send(ServerEvent::Error(e.to_string())).await;
                return;
            }
        };

        for event in events {
            if tx.send(event).await.is_err() {
                return;
            }
        }
    }

    let _ = tx.send(ServerEvent::Closed).await;
}

fn inbound_events(inbound: Inbound) -> Vec<ServerEvent> {
    match inbound {
        Inbound::Events(events) => events,
        Inbound::SetupComplete => Vec::new(),
    }
}
