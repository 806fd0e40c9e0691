// Copyright (c) Telephone Contributors
// SPDX-License-Identifier: Apache-2.0

//! Network transport layer

use crate::error::{NetworkError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Interface the peer listeners bind to
    pub bind_address: String,

    /// Connection timeout in milliseconds
    pub connection_timeout_ms: u64,

    /// Disable Nagle's algorithm on peer sockets
    pub nodelay: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            connection_timeout_ms: crate::constants::CONNECTION_TIMEOUT.as_millis() as u64,
            nodelay: true,
        }
    }
}

impl TransportConfig {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }
}

/// Connection metadata
#[derive(Debug, Clone)]
pub struct ConnectionMetadata {
    /// Remote peer address
    pub remote_addr: SocketAddr,

    /// Whether this is an inbound connection
    pub is_inbound: bool,
}

/// Connection handle
pub struct Connection {
    /// Connection metadata
    pub metadata: ConnectionMetadata,

    /// Underlying TCP stream
    stream: TcpStream,
}

impl Connection {
    /// Create a new connection
    pub fn new(stream: TcpStream, is_inbound: bool) -> Result<Self> {
        let remote_addr = stream.peer_addr()?;

        Ok(Self {
            metadata: ConnectionMetadata {
                remote_addr,
                is_inbound,
            },
            stream,
        })
    }

    /// Split into metadata and the owned stream
    pub fn into_parts(self) -> (ConnectionMetadata, TcpStream) {
        (self.metadata, self.stream)
    }
}

/// TCP transport used for peer links
#[derive(Debug, Clone)]
pub struct TcpTransport {
    config: TransportConfig,
}

impl TcpTransport {
    /// Create a new TCP transport
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Open a listening socket on `port` (0 picks a free port)
    pub async fn listen(&self, port: u16) -> Result<TcpListener> {
        let addr = format!("{}:{}", self.config.bind_address, port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| NetworkError::BindFailed { port, source })?;

        tracing::info!(addr = %listener.local_addr()?, "Transport listening");
        Ok(listener)
    }

    /// Accept one inbound connection from `listener`
    pub async fn accept(&self, listener: &TcpListener) -> Result<Connection> {
        let (stream, _addr) = listener.accept().await?;
        self.prepare(&stream);
        Connection::new(stream, true)
    }

    /// Dial a remote peer, trying every address the host resolves to
    pub async fn dial(&self, host: &str, port: u16) -> Result<Connection> {
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| NetworkError::HostResolution(format!("{}: {}", host, e)))?
            .collect();

        if addrs.is_empty() {
            return Err(NetworkError::HostResolution(format!(
                "{} resolved to no addresses",
                host
            )));
        }

        let timeout = self.config.connection_timeout();
        let mut last_error = None;

        for addr in addrs {
            match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => {
                    self.prepare(&stream);
                    return Connection::new(stream, false);
                }
                Ok(Err(e)) => {
                    tracing::debug!(%addr, error = %e, "Dial attempt failed");
                    last_error = Some(NetworkError::ConnectionError(format!(
                        "Failed to connect to {}: {}",
                        addr, e
                    )));
                }
                Err(_) => {
                    last_error = Some(NetworkError::TimeoutError(format!(
                        "Connection to {} timed out",
                        addr
                    )));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            NetworkError::ConnectionError(format!("Failed to connect to {}:{}", host, port))
        }))
    }

    fn prepare(&self, stream: &TcpStream) {
        if let Err(e) = stream.set_nodelay(self.config.nodelay) {
            tracing::warn!(error = %e, "Failed to set TCP_NODELAY");
        }
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(TransportConfig::default())
    }
}
