//! Socket.IO connection to the relay server
//!
//! This module provides:
//! - `packet`: Engine.IO / Socket.IO text codec
//! - `client`: WebSocket-backed connection task
//! - `manager`: lazily created, explicitly owned shared connection

pub mod client;
pub mod manager;
pub mod packet;
pub mod transport;

pub use client::{websocket_url, SocketClient, SocketConnector};
pub use manager::ConnectionManager;
pub use transport::{ConnectionState, Connector, Transport, TransportError};
