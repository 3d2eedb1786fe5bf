// Integration tests for the Socket.IO client
//
// Each test runs a scripted Socket.IO server on a local WebSocket and checks
// the exact packets the client puts on the wire.

use anyhow::{bail, Context, Result};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};
use voice_relay::audio::{pcm, ChunkMessage, AUDIO_DATA_EVENT};
use voice_relay::socket::{ConnectionState, SocketClient, Transport, TransportError};

const OPEN: &str = r#"0{"sid":"eio-sid","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;

type ServerSocket = WebSocketStream<TcpStream>;

async fn accept(listener: &TcpListener) -> Result<(ServerSocket, String)> {
    let (stream, _) = listener.accept().await?;
    let mut path = String::new();
    let ws = accept_hdr_async(stream, |req: &Request, resp: Response| {
        path = req.uri().to_string();
        Ok::<_, ErrorResponse>(resp)
    })
    .await?;
    Ok((ws, path))
}

async fn next_message(ws: &mut ServerSocket) -> Result<Message> {
    let message = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .context("timed out waiting for client")?
        .context("client closed the socket")??;
    Ok(message)
}

async fn next_text(ws: &mut ServerSocket) -> Result<String> {
    match next_message(ws).await? {
        Message::Text(text) => Ok(text),
        other => bail!("expected text frame, got {:?}", other),
    }
}

async fn wait_for_state(client: &SocketClient, wanted: fn(&ConnectionState) -> bool) -> ConnectionState {
    for _ in 0..200 {
        let state = client.state();
        if wanted(&state) {
            return state;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    client.state()
}

#[derive(Debug)]
struct Observed {
    path: String,
    event: String,
    attachment: Vec<u8>,
    got_pong: bool,
}

#[tokio::test]
async fn test_handshake_and_binary_emit() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let (observed_tx, observed_rx) = oneshot::channel();

    let server = tokio::spawn(async move {
        let (mut ws, path) = accept(&listener).await?;

        ws.send(Message::Text(OPEN.to_string())).await?;
        assert_eq!(next_text(&mut ws).await?, "40");
        ws.send(Message::Text(r#"40{"sid":"sio-sid"}"#.to_string())).await?;
        ws.send(Message::Text("2".to_string())).await?;

        let mut got_pong = false;
        let mut event = None;
        let mut attachment = None;
        while !(got_pong && attachment.is_some()) {
            match next_message(&mut ws).await? {
                Message::Text(text) if text == "3" => got_pong = true,
                Message::Text(text) if text.starts_with("451-") => event = Some(text),
                Message::Binary(bytes) => attachment = Some(bytes),
                other => bail!("unexpected frame {:?}", other),
            }
        }

        let _ = observed_tx.send(Observed {
            path,
            event: event.context("no event before attachment")?,
            attachment: attachment.unwrap_or_default(),
            got_pong,
        });

        // Client disconnect
        let goodbye = next_text(&mut ws).await?;
        anyhow::Ok(goodbye)
    });

    let client = SocketClient::connect(&format!("http://{}", addr));

    // Queued until the namespace is joined
    let chunk = ChunkMessage::new(vec![1, -1, 32767], 1_700_000_000_000);
    let (data, attachments) = chunk.to_payload();
    client.emit(AUDIO_DATA_EVENT, data, attachments)?;

    let sid = client.wait_connected().await?;
    assert_eq!(sid, "sio-sid");

    let observed = tokio::time::timeout(Duration::from_secs(5), observed_rx).await??;
    assert_eq!(observed.path, "/socket.io/?EIO=4&transport=websocket");
    assert!(observed.got_pong);
    assert_eq!(
        observed.event,
        r#"451-["audio_data",{"buffer":{"_placeholder":true,"num":0},"mode":"both","timestamp":1700000000000}]"#
    );
    assert_eq!(pcm::from_le_bytes(&observed.attachment), vec![1, -1, 32767]);

    client.disconnect();
    assert_eq!(server.await??, "41");

    let state = wait_for_state(&client, |s| *s == ConnectionState::Disconnected).await;
    assert_eq!(state, ConnectionState::Disconnected);

    Ok(())
}

#[tokio::test]
async fn test_namespace_rejection_fails_connection() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let server = tokio::spawn(async move {
        let (mut ws, _) = accept(&listener).await?;
        ws.send(Message::Text(OPEN.to_string())).await?;
        assert_eq!(next_text(&mut ws).await?, "40");
        ws.send(Message::Text(r#"44{"message":"unauthorized"}"#.to_string())).await?;
        anyhow::Ok(())
    });

    let client = SocketClient::connect(&format!("http://{}", addr));
    let err = client.wait_connected().await.unwrap_err();

    assert!(err.to_string().contains("unauthorized"), "got: {:#}", err);
    assert!(matches!(client.state(), ConnectionState::Failed(_)));

    server.await??;
    Ok(())
}

#[tokio::test]
async fn test_unreachable_server_reports_failure_asynchronously() -> Result<()> {
    // Grab a free port, then close it so nothing is listening
    let addr = TcpListener::bind("127.0.0.1:0").await?.local_addr()?;

    let client = SocketClient::connect(&format!("http://{}", addr));
    assert!(client.wait_connected().await.is_err());

    let state = wait_for_state(&client, |s| matches!(s, ConnectionState::Failed(_))).await;
    assert!(matches!(state, ConnectionState::Failed(_)));

    // Nothing is left to deliver events
    let result = client.emit("audio_data", serde_json::json!({}), Vec::new());
    assert!(matches!(result, Err(TransportError::Closed)));

    Ok(())
}

#[tokio::test]
async fn test_server_disconnect_closes_connection() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let server = tokio::spawn(async move {
        let (mut ws, _) = accept(&listener).await?;
        ws.send(Message::Text(OPEN.to_string())).await?;
        assert_eq!(next_text(&mut ws).await?, "40");
        ws.send(Message::Text(r#"40{"sid":"sio-sid"}"#.to_string())).await?;
        assert_eq!(next_text(&mut ws).await?, r#"42["hello",{}]"#);
        ws.send(Message::Text("41".to_string())).await?;
        anyhow::Ok(())
    });

    let client = SocketClient::connect(&format!("http://{}", addr));
    client.wait_connected().await?;
    client.emit("hello", serde_json::json!({}), Vec::new())?;

    let state = wait_for_state(&client, |s| *s == ConnectionState::Disconnected).await;
    assert_eq!(state, ConnectionState::Disconnected);

    server.await??;
    Ok(())
}
