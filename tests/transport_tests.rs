// Integration tests for the websocket agent client
//
// Each test runs a one-connection agent endpoint on a local port and drives
// the real StreamingTransportClient against it.

use base64::Engine;
use futures::{SinkExt, StreamExt};
use interview_live::audio::EncodedAudioChunk;
use interview_live::error::SessionError;
use interview_live::transport::{
    AgentSessionConfig, AgentTransport, ConnectionState, ServerEvent, StreamingTransportClient,
    TransportConfig,
};
use serde_json::Value;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

type AgentSocket = WebSocketStream<TcpStream>;

const SETUP_COMPLETE: &str = r#"{"setupComplete":{}}"#;

/// Listen on a free local port. The task accepts one client, reads its setup
/// message, answers with `reply` and hands back the open socket.
async fn local_agent(reply: Message) -> (String, JoinHandle<(AgentSocket, Value)>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    let task = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let setup = next_json(&mut ws).await;
        ws.send(reply).await.unwrap();
        (ws, setup)
    });

    (url, task)
}

async fn next_json(ws: &mut AgentSocket) -> Value {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            other => panic!("expected a text message, got {:?}", other),
        }
    }
}

fn client(url: String) -> StreamingTransportClient {
    StreamingTransportClient::new(TransportConfig { url, api_key: None })
}

fn agent_config() -> AgentSessionConfig {
    AgentSessionConfig {
        model: "models/test".to_string(),
        voice: "Kore".to_string(),
        instructions: "Ask one question".to_string(),
    }
}

async fn next_event(client: &mut StreamingTransportClient) -> Option<ServerEvent> {
    tokio::time::timeout(Duration::from_secs(5), client.next_event())
        .await
        .expect("timed out waiting for an event")
}

#[tokio::test]
async fn test_handshake_sends_setup_and_opens() {
    let (url, agent) = local_agent(Message::Text(SETUP_COMPLETE.into())).await;
    let mut client = client(url);

    client.connect(&agent_config()).await.unwrap();
    assert_eq!(client.state(), ConnectionState::Open);
    assert!(client.is_open());

    let (_ws, setup) = agent.await.unwrap();
    assert_eq!(setup["setup"]["model"], "models/test");
    let voice = &setup["setup"]["generationConfig"]["speechConfig"]["voiceConfig"];
    assert_eq!(voice["prebuiltVoiceConfig"]["voiceName"], "Kore");
    assert_eq!(setup["setup"]["systemInstruction"]["parts"][0]["text"], "Ask one question");

    // One connection per session
    let again = client.connect(&agent_config()).await;
    assert!(matches!(again, Err(SessionError::Connect(_))));

    client.close().await;
    assert_eq!(client.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_events_arrive_in_order_then_normal_close() {
    let (url, agent) = local_agent(Message::Text(SETUP_COMPLETE.into())).await;
    let mut client = client(url);
    client.connect(&agent_config()).await.unwrap();
    let (mut ws, _) = agent.await.unwrap();

    let spoken = r#"{"serverContent":{"modelTurn":{"parts":[{"inlineData":{"mimeType":"audio/pcm;rate=24000","data":"AAE="}}]},"outputTranscription":{"text":"Hello"},"turnComplete":true}}"#;
    let heard = r#"{"serverContent":{"inputTranscription":{"text":"Hi there"}}}"#;
    ws.send(Message::Text(spoken.into())).await.unwrap();
    ws.send(Message::Text(heard.into())).await.unwrap();
    ws.send(Message::Close(Some(CloseFrame {
        code: CloseCode::Normal,
        reason: "bye".into(),
    })))
    .await
    .unwrap();

    assert_eq!(next_event(&mut client).await, Some(ServerEvent::AudioDelta(vec![0, 1])));
    assert_eq!(
        next_event(&mut client).await,
        Some(ServerEvent::OutputTextDelta("Hello".into()))
    );
    assert_eq!(next_event(&mut client).await, Some(ServerEvent::TurnComplete));
    assert_eq!(
        next_event(&mut client).await,
        Some(ServerEvent::InputTextDelta("Hi there".into()))
    );
    assert_eq!(next_event(&mut client).await, Some(ServerEvent::Closed));

    // Nothing after the terminal event
    assert_eq!(next_event(&mut client).await, None);
    assert_eq!(client.state(), ConnectionState::Closed);
    assert!(matches!(
        client.send(EncodedAudioChunk {
            sequence: 0,
            pcm: vec![0, 0],
            sample_rate: 16000,
            timestamp_ms: 0,
        }),
        Err(SessionError::NotConnected)
    ));
}

#[tokio::test]
async fn test_abnormal_close_is_an_error() {
    let (url, agent) = local_agent(Message::Text(SETUP_COMPLETE.into())).await;
    let mut client = client(url);
    client.connect(&agent_config()).await.unwrap();
    let (mut ws, _) = agent.await.unwrap();

    ws.send(Message::Close(Some(CloseFrame {
        code: CloseCode::Error,
        reason: "internal".into(),
    })))
    .await
    .unwrap();

    assert_eq!(
        next_event(&mut client).await,
        Some(ServerEvent::Error("1011: internal".into()))
    );
    assert_eq!(next_event(&mut client).await, None);
}

#[tokio::test]
async fn test_outbound_chunks_keep_capture_order() {
    let (url, agent) = local_agent(Message::Text(SETUP_COMPLETE.into())).await;
    let mut client = client(url);
    client.connect(&agent_config()).await.unwrap();
    let (mut ws, _) = agent.await.unwrap();

    for sequence in 0..5u8 {
        client
            .send(EncodedAudioChunk {
                sequence: sequence as u64,
                pcm: vec![sequence, 0],
                sample_rate: 16000,
                timestamp_ms: sequence as u64 * 20,
            })
            .unwrap();
    }

    for sequence in 0..5u8 {
        let message = next_json(&mut ws).await;
        let media = &message["realtimeInput"]["mediaChunks"][0];
        assert_eq!(media["mimeType"], "audio/pcm;rate=16000");
        let pcm = base64::engine::general_purpose::STANDARD
            .decode(media["data"].as_str().unwrap())
            .unwrap();
        assert_eq!(pcm, vec![sequence, 0]);
    }

    client.close().await;
    let after_close = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .unwrap();
    assert!(matches!(after_close, Some(Ok(Message::Close(_))) | None));
}

#[tokio::test]
async fn test_server_error_during_handshake_fails_connect() {
    let rejection = r#"{"error":{"code":403,"message":"API key not valid"}}"#;
    let (url, agent) = local_agent(Message::Text(rejection.into())).await;
    let mut client = client(url);

    let result = tokio::time::timeout(Duration::from_secs(5), client.connect(&agent_config()))
        .await
        .expect("handshake hung on a server error");

    match result {
        Err(SessionError::Connect(reason)) => {
            assert!(reason.contains("403: API key not valid"), "reason: {}", reason)
        }
        other => panic!("expected a connect failure, got {:?}", other),
    }
    assert_eq!(client.state(), ConnectionState::Closed);
    assert!(next_event(&mut client).await.is_none());
    drop(agent);
}

#[tokio::test]
async fn test_close_during_handshake_fails_connect() {
    let (url, _agent) = local_agent(Message::Close(Some(CloseFrame {
        code: CloseCode::Policy,
        reason: "quota exceeded".into(),
    })))
    .await;
    let mut client = client(url);

    match client.connect(&agent_config()).await {
        Err(SessionError::Connect(reason)) => {
            assert!(reason.contains("quota exceeded"), "reason: {}", reason)
        }
        other => panic!("expected a connect failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_endpoint_fails_connect() {
    // Reserve a port, then free it so nothing is listening
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    drop(listener);

    let mut client = client(url);
    let result = client.connect(&agent_config()).await;

    assert!(matches!(result, Err(SessionError::Connect(_))));
    assert_eq!(client.state(), ConnectionState::Closed);
}
