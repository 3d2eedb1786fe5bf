// Engine.IO v4 / Socket.IO v5 packet codec
//
// Only the text encoding is handled here. Binary attachments travel as
// separate WebSocket binary frames right after the packet that announces
// them.

use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt::Write as _;
use thiserror::Error;

/// Engine.IO protocol revision spoken by the client
pub const ENGINE_IO_VERSION: u8 = 4;

/// Default Socket.IO namespace
pub const DEFAULT_NAMESPACE: &str = "/";

#[derive(Error, Debug)]
pub enum PacketError {
    #[error("empty packet")]
    Empty,

    #[error("unknown packet type {0:?}")]
    UnknownType(char),

    #[error("malformed attachment count")]
    InvalidAttachments,

    #[error("invalid packet payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Handshake data sent by the server in the OPEN packet
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

/// Transport-level packet
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(Handshake),
    Close,
    Ping(String),
    Pong(String),
    /// Carries an encoded Socket.IO packet
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn decode(text: &str) -> Result<Self, PacketError> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or(PacketError::Empty)?;
        let rest = chars.as_str();

        Ok(match kind {
            '0' => EnginePacket::Open(serde_json::from_str(rest)?),
            '1' => EnginePacket::Close,
            '2' => EnginePacket::Ping(rest.to_string()),
            '3' => EnginePacket::Pong(rest.to_string()),
            '4' => EnginePacket::Message(rest.to_string()),
            '5' => EnginePacket::Upgrade,
            '6' => EnginePacket::Noop,
            other => return Err(PacketError::UnknownType(other)),
        })
    }

    pub fn encode(&self) -> String {
        match self {
            // Clients never send OPEN; the sid is enough to identify it in logs
            EnginePacket::Open(h) => format!("0{}", json!({ "sid": h.sid })),
            EnginePacket::Close => "1".to_string(),
            EnginePacket::Ping(data) => format!("2{data}"),
            EnginePacket::Pong(data) => format!("3{data}"),
            EnginePacket::Message(data) => format!("4{data}"),
            EnginePacket::Upgrade => "5".to_string(),
            EnginePacket::Noop => "6".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Connect,
    Disconnect,
    Event,
    Ack,
    ConnectError,
    BinaryEvent,
    BinaryAck,
}

impl PacketKind {
    fn code(self) -> char {
        match self {
            PacketKind::Connect => '0',
            PacketKind::Disconnect => '1',
            PacketKind::Event => '2',
            PacketKind::Ack => '3',
            PacketKind::ConnectError => '4',
            PacketKind::BinaryEvent => '5',
            PacketKind::BinaryAck => '6',
        }
    }

    fn from_code(c: char) -> Result<Self, PacketError> {
        Ok(match c {
            '0' => PacketKind::Connect,
            '1' => PacketKind::Disconnect,
            '2' => PacketKind::Event,
            '3' => PacketKind::Ack,
            '4' => PacketKind::ConnectError,
            '5' => PacketKind::BinaryEvent,
            '6' => PacketKind::BinaryAck,
            other => return Err(PacketError::UnknownType(other)),
        })
    }

    fn is_binary(self) -> bool {
        matches!(self, PacketKind::BinaryEvent | PacketKind::BinaryAck)
    }
}

/// Application-level packet
///
/// Text form: `<type>[<attachments>-][<namespace>,][<ack id>][<json data>]`
#[derive(Debug, Clone, PartialEq)]
pub struct SocketPacket {
    pub kind: PacketKind,
    pub namespace: String,
    pub id: Option<u64>,
    pub attachments: usize,
    pub data: Option<Value>,
}

impl SocketPacket {
    fn new(kind: PacketKind, data: Option<Value>) -> Self {
        Self {
            kind,
            namespace: DEFAULT_NAMESPACE.to_string(),
            id: None,
            attachments: 0,
            data,
        }
    }

    pub fn connect() -> Self {
        Self::new(PacketKind::Connect, None)
    }

    pub fn disconnect() -> Self {
        Self::new(PacketKind::Disconnect, None)
    }

    pub fn event(name: &str, payload: Value) -> Self {
        Self::new(PacketKind::Event, Some(json!([name, payload])))
    }

    /// Event whose payload references `attachments` binary frames
    pub fn binary_event(name: &str, payload: Value, attachments: usize) -> Self {
        let mut packet = Self::new(PacketKind::BinaryEvent, Some(json!([name, payload])));
        packet.attachments = attachments;
        packet
    }

    /// Name of an EVENT / BINARY_EVENT packet
    pub fn event_name(&self) -> Option<&str> {
        self.data.as_ref()?.as_array()?.first()?.as_str()
    }

    pub fn encode(&self) -> String {
        let mut out = String::new();
        out.push(self.kind.code());

        if self.kind.is_binary() {
            let _ = write!(out, "{}-", self.attachments);
        }
        if self.namespace != DEFAULT_NAMESPACE {
            out.push_str(&self.namespace);
            out.push(',');
        }
        if let Some(id) = self.id {
            let _ = write!(out, "{id}");
        }
        if let Some(data) = &self.data {
            out.push_str(&data.to_string());
        }

        out
    }

    pub fn decode(text: &str) -> Result<Self, PacketError> {
        let mut chars = text.chars();
        let kind = PacketKind::from_code(chars.next().ok_or(PacketError::Empty)?)?;
        let mut rest = chars.as_str();

        let mut attachments = 0;
        if kind.is_binary() {
            let (count, tail) = rest.split_once('-').ok_or(PacketError::InvalidAttachments)?;
            attachments = count.parse().map_err(|_| PacketError::InvalidAttachments)?;
            rest = tail;
        }

        let mut namespace = DEFAULT_NAMESPACE.to_string();
        if rest.starts_with('/') {
            match rest.split_once(',') {
                Some((ns, tail)) => {
                    namespace = ns.to_string();
                    rest = tail;
                }
                None => {
                    namespace = rest.to_string();
                    rest = "";
                }
            }
        }

        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        let id = if digits > 0 {
            rest[..digits].parse().ok()
        } else {
            None
        };
        rest = &rest[digits..];

        let data = if rest.is_empty() {
            None
        } else {
            Some(serde_json::from_str(rest)?)
        };

        Ok(Self {
            kind,
            namespace,
            id,
            attachments,
            data,
        })
    }
}

/// JSON stand-in for binary attachment `num`
pub fn attachment_placeholder(num: usize) -> Value {
    json!({ "_placeholder": true, "num": num })
}
