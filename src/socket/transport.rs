use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("connection is closed")]
    Closed,
}

/// Lifecycle of one duplex connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake in progress; emits are queued
    Connecting,
    Connected { sid: String },
    /// Closed by either side
    Disconnected,
    /// Connect or transport failure
    Failed(String),
}

/// A duplex connection that named events can be emitted over
#[cfg_attr(test, mockall::automock)]
pub trait Transport: Send + Sync {
    /// Queue an event for delivery
    ///
    /// Fire-and-forget: success only means the event was accepted for
    /// sending, not that the server received it.
    fn emit(&self, event: &str, data: Value, attachments: Vec<Vec<u8>>) -> Result<(), TransportError>;

    /// Close the connection; further emits fail
    fn disconnect(&self);

    fn state(&self) -> ConnectionState;
}

/// Opens connections for the connection manager
#[cfg_attr(test, mockall::automock)]
pub trait Connector: Send + Sync {
    /// Start connecting to `url`; failures surface through the returned
    /// connection's state
    fn connect(&self, url: &str) -> Arc<dyn Transport>;
}
