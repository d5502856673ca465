//! Duplex streaming connection to the remote interview agent
//!
//! - `client`: websocket client, connection state machine, `AgentTransport` seam
//! - `messages`: JSON wire format (setup, realtime audio input, server content)
//! - `event`: the closed `ServerEvent` variant the session dispatches on

pub mod client;
pub mod event;
pub mod messages;

pub use client::{
    AgentSessionConfig, AgentTransport, ConnectionState, StreamingTransportClient, TransportConfig,
};
pub use event::ServerEvent;
pub use messages::{decode_server_message, Inbound};
