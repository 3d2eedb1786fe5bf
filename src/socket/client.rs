// Socket.IO client over a WebSocket
//
// `SocketClient::connect` returns immediately; the handshake runs in a
// background task. Events emitted before the handshake completes are queued
// and flushed once the namespace is joined.

use anyhow::{anyhow, bail, Context, Result};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::packet::{EnginePacket, Handshake, PacketKind, SocketPacket, ENGINE_IO_VERSION};
use super::transport::{ConnectionState, Connector, Transport, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;
type WsReader = SplitStream<WsStream>;

/// Outbound work for the connection task
enum Command {
    Emit {
        text: String,
        attachments: Vec<Vec<u8>>,
    },
    Disconnect,
}

/// Handle to one Socket.IO connection
pub struct SocketClient {
    url: String,
    commands: mpsc::UnboundedSender<Command>,
    state: Arc<watch::Sender<ConnectionState>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SocketClient {
    /// Start connecting to a Socket.IO server such as `http://localhost:5000`
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(url: &str) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(ConnectionState::Connecting);
        let state = Arc::new(state_tx);

        let task = tokio::spawn(run_connection(url.to_string(), commands_rx, Arc::clone(&state)));

        Self {
            url: url.to_string(),
            commands: commands_tx,
            state,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Wait until the connection leaves the `Connecting` state
    pub async fn wait_connected(&self) -> Result<String> {
        let mut state = self.state.subscribe();
        let settled = state
            .wait_for(|s| !matches!(s, ConnectionState::Connecting))
            .await
            .map_err(|_| anyhow!("Connection state closed"))?
            .clone();

        match settled {
            ConnectionState::Connected { sid } => Ok(sid),
            ConnectionState::Failed(reason) => bail!("Connection failed: {}", reason),
            other => bail!("Connection not established: {:?}", other),
        }
    }
}

impl Transport for SocketClient {
    fn emit(&self, event: &str, data: Value, attachments: Vec<Vec<u8>>) -> Result<(), TransportError> {
        let packet = if attachments.is_empty() {
            SocketPacket::event(event, data)
        } else {
            SocketPacket::binary_event(event, data, attachments.len())
        };

        let text = EnginePacket::Message(packet.encode()).encode();

        self.commands
            .send(Command::Emit { text, attachments })
            .map_err(|_| TransportError::Closed)
    }

    fn disconnect(&self) {
        info!("Disconnecting from {}", self.url);

        let still_connecting = matches!(*self.state.borrow(), ConnectionState::Connecting);

        if self.commands.send(Command::Disconnect).is_err() || still_connecting {
            // Nothing reads the queue until the handshake finishes
            if let Ok(mut task) = self.task.lock() {
                if let Some(task) = task.take() {
                    task.abort();
                }
            }
            self.state.send_replace(ConnectionState::Disconnected);
        }
    }

    fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }
}

impl Drop for SocketClient {
    fn drop(&mut self) {
        // Once connected, the closed command queue ends the session cleanly
        if !matches!(*self.state.borrow(), ConnectionState::Connecting) {
            return;
        }
        if let Ok(mut task) = self.task.lock() {
            if let Some(task) = task.take() {
                task.abort();
            }
        }
    }
}

/// Connector producing `SocketClient` connections
#[derive(Debug, Default, Clone, Copy)]
pub struct SocketConnector;

impl Connector for SocketConnector {
    fn connect(&self, url: &str) -> Arc<dyn Transport> {
        Arc::new(SocketClient::connect(url))
    }
}

/// Build the WebSocket endpoint for a Socket.IO server URL
pub fn websocket_url(server_url: &str) -> Result<String> {
    let (scheme, rest) = server_url
        .split_once("://")
        .ok_or_else(|| anyhow!("Server URL has no scheme: {}", server_url))?;

    let ws_scheme = match scheme {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => bail!("Unsupported URL scheme: {}", other),
    };

    let host = rest.trim_end_matches('/');
    if host.is_empty() {
        bail!("Server URL has no host: {}", server_url);
    }

    Ok(format!(
        "{}://{}/socket.io/?EIO={}&transport=websocket",
        ws_scheme, host, ENGINE_IO_VERSION
    ))
}

async fn run_connection(
    url: String,
    mut commands: mpsc::UnboundedReceiver<Command>,
    state: Arc<watch::Sender<ConnectionState>>,
) {
    let result = drive(&url, &mut commands, &state).await;

    // Refuse further emits before publishing the final state
    commands.close();

    match result {
        Ok(()) => {
            info!("Connection to {} closed", url);
            state.send_replace(ConnectionState::Disconnected);
        }
        Err(e) => {
            warn!("Connection to {} failed: {:#}", url, e);
            state.send_replace(ConnectionState::Failed(format!("{:#}", e)));
        }
    }
}

async fn drive(
    url: &str,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    state: &watch::Sender<ConnectionState>,
) -> Result<()> {
    let ws_url = websocket_url(url)?;
    info!("Connecting to Socket.IO server: {}", ws_url);

    let (ws_stream, _) = connect_async(ws_url.as_str())
        .await
        .context("WebSocket connect failed")?;
    let (mut write, mut read) = ws_stream.split();

    let handshake = read_handshake(&mut read).await?;
    debug!(
        "Engine.IO open (sid={}, ping_interval={}ms, ping_timeout={}ms)",
        handshake.sid, handshake.ping_interval, handshake.ping_timeout
    );

    send_text(&mut write, EnginePacket::Message(SocketPacket::connect().encode())).await?;
    let sid = join_namespace(&mut read, &mut write).await?;

    info!("Connected to {} (sid={})", url, sid);
    state.send_replace(ConnectionState::Connected { sid });

    let liveness = Duration::from_millis(handshake.ping_interval + handshake.ping_timeout);
    let mut deadline = Instant::now() + liveness;

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Emit { text, attachments }) => {
                    write.send(Message::Text(text)).await.context("Failed to send event")?;
                    for attachment in attachments {
                        write
                            .send(Message::Binary(attachment))
                            .await
                            .context("Failed to send attachment")?;
                    }
                }
                Some(Command::Disconnect) | None => {
                    let _ = send_text(&mut write, EnginePacket::Message(SocketPacket::disconnect().encode())).await;
                    let _ = write.close().await;
                    return Ok(());
                }
            },
            frame = read.next() => {
                deadline = Instant::now() + liveness;
                match frame {
                    None | Some(Ok(Message::Close(_))) => return Ok(()),
                    Some(Err(e)) => return Err(e).context("WebSocket read failed"),
                    Some(Ok(Message::Text(text))) => {
                        if !handle_server_packet(&text, &mut write).await? {
                            return Ok(());
                        }
                    }
                    Some(Ok(_)) => {}
                }
            }
            _ = tokio::time::sleep_until(deadline) => {
                bail!("No ping from server within {}ms", liveness.as_millis());
            }
        }
    }
}

async fn send_text(write: &mut WsWriter, packet: EnginePacket) -> Result<()> {
    write
        .send(Message::Text(packet.encode()))
        .await
        .context("WebSocket send failed")
}

async fn next_text(read: &mut WsReader) -> Result<String> {
    loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => return Ok(text),
            Some(Ok(Message::Close(_))) | None => bail!("Connection closed during handshake"),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e).context("WebSocket read failed"),
        }
    }
}

async fn read_handshake(read: &mut WsReader) -> Result<Handshake> {
    let text = next_text(read).await?;
    match EnginePacket::decode(&text)? {
        EnginePacket::Open(handshake) => Ok(handshake),
        other => bail!("Expected Engine.IO open packet, got {:?}", other),
    }
}

/// Wait for the namespace CONNECT acknowledgement, answering pings meanwhile
async fn join_namespace(read: &mut WsReader, write: &mut WsWriter) -> Result<String> {
    loop {
        let text = next_text(read).await?;
        match EnginePacket::decode(&text)? {
            EnginePacket::Ping(data) => send_text(write, EnginePacket::Pong(data)).await?,
            EnginePacket::Close => bail!("Server closed the connection during handshake"),
            EnginePacket::Message(body) => {
                let packet = SocketPacket::decode(&body)?;
                match packet.kind {
                    PacketKind::Connect => {
                        let sid = packet
                            .data
                            .as_ref()
                            .and_then(|d| d.get("sid"))
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string();
                        return Ok(sid);
                    }
                    PacketKind::ConnectError => {
                        let reason = packet
                            .data
                            .map(|d| d.to_string())
                            .unwrap_or_else(|| "unknown".to_string());
                        bail!("Namespace connect rejected: {}", reason);
                    }
                    other => debug!("Ignoring {:?} packet before connect", other),
                }
            }
            other => debug!("Ignoring {:?} during handshake", other),
        }
    }
}

/// Handle one inbound packet; returns false when the session has ended
async fn handle_server_packet(text: &str, write: &mut WsWriter) -> Result<bool> {
    let packet = match EnginePacket::decode(text) {
        Ok(packet) => packet,
        Err(e) => {
            warn!("Dropping malformed packet: {}", e);
            return Ok(true);
        }
    };

    match packet {
        EnginePacket::Ping(data) => send_text(write, EnginePacket::Pong(data)).await?,
        EnginePacket::Close => return Ok(false),
        EnginePacket::Message(body) => match SocketPacket::decode(&body) {
            Ok(packet) if packet.kind == PacketKind::Disconnect => {
                info!("Server closed namespace {}", packet.namespace);
                return Ok(false);
            }
            Ok(packet) => debug!(
                "Server sent {:?} {}",
                packet.kind,
                packet.event_name().unwrap_or_default()
            ),
            Err(e) => warn!("Dropping malformed Socket.IO packet: {}", e),
        },
        other => debug!("Ignoring {:?}", other),
    }

    Ok(true)
}
