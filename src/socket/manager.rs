use std::sync::Arc;
use tracing::{debug, info};

use super::client::SocketConnector;
use super::transport::{Connector, Transport};

/// Owns the single shared connection to the relay server
///
/// The connection is created on first use and lives until `disconnect`.
/// Whoever composes the pipeline owns the manager and hands the connection
/// to recorders explicitly.
pub struct ConnectionManager {
    url: String,
    connector: Box<dyn Connector>,
    connection: Option<Arc<dyn Transport>>,
}

impl ConnectionManager {
    pub fn new(url: impl Into<String>, connector: Box<dyn Connector>) -> Self {
        Self {
            url: url.into(),
            connector,
            connection: None,
        }
    }

    /// Manager backed by real Socket.IO connections
    pub fn socket_io(url: impl Into<String>) -> Self {
        Self::new(url, Box::new(SocketConnector))
    }

    /// Return the shared connection, creating it if there is none
    pub fn get_or_create(&mut self) -> Arc<dyn Transport> {
        if let Some(connection) = &self.connection {
            return Arc::clone(connection);
        }

        info!("Opening connection to {}", self.url);
        let connection = self.connector.connect(&self.url);
        self.connection = Some(Arc::clone(&connection));
        connection
    }

    /// Close and forget the shared connection; a no-op when there is none
    pub fn disconnect(&mut self) {
        match self.connection.take() {
            Some(connection) => connection.disconnect(),
            None => debug!("No connection to close"),
        }
    }

    pub fn has_connection(&self) -> bool {
        self.connection.is_some()
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}
