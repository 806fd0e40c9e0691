// Copyright (c) Telephone Contributors
// SPDX-License-Identifier: Apache-2.0

//! Resolver server run by the root node

use super::{DiscoveryConfig, DiscoveryPacket, PeerSelection};
use crate::constants::MAX_DATAGRAM_SIZE;
use crate::error::{NetworkError, Result};
use std::net::SocketAddr;
use telephone_types::{NetworkType, PeerConfiguration};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Hands out listening ports to joining leaves
#[derive(Debug, Clone)]
pub struct PortAllocator {
    base: u16,
    next: u16,
}

impl PortAllocator {
    /// `base` of 0 means leaves choose their own port
    pub fn new(base: u16) -> Self {
        Self { base, next: base }
    }

    pub fn next_port(&mut self) -> u16 {
        if self.base == 0 {
            return 0;
        }
        let port = self.next;
        self.next = self.next.checked_add(1).unwrap_or(self.base);
        port
    }
}

/// Answers discovery requests on behalf of the root
pub struct ResolverServer {
    socket: UdpSocket,
    network_type: NetworkType,
    advertise_address: Option<String>,
    root_port: u16,
    peer_selection: PeerSelection,
    ports: PortAllocator,
    /// Last admitted leaf, used by [`PeerSelection::Chain`]
    last_joined: Option<(String, u16)>,
}

impl ResolverServer {
    /// Bind the discovery socket. `root_port` is where the root accepts peers.
    pub async fn bind(config: &DiscoveryConfig, root_port: u16) -> Result<Self> {
        let addr = format!("0.0.0.0:{}", config.discovery_port);
        let socket = UdpSocket::bind(&addr)
            .await
            .map_err(|source| NetworkError::BindFailed {
                port: config.discovery_port,
                source,
            })?;

        let base = match (config.leaf_port_base, root_port) {
            (Some(base), _) => base,
            (None, 0) => 0,
            (None, port) => port.saturating_add(1),
        };

        tracing::info!(
            addr = %socket.local_addr()?,
            root_port,
            leaf_port_base = base,
            selection = ?config.peer_selection,
            "Resolver server bound"
        );

        Ok(Self {
            socket,
            network_type: config.network_type,
            advertise_address: config.advertise_address.clone(),
            root_port,
            peer_selection: config.peer_selection,
            ports: PortAllocator::new(base),
            last_joined: None,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Run the responder on its own task until `cancel` fires
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    /// Serve requests until `cancel` fires
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => break,
                received = self.socket.recv_from(&mut buf) => received,
            };

            let (len, from) = match received {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(error = %e, "Discovery receive failed");
                    continue;
                }
            };

            match DiscoveryPacket::from_bytes(&buf[..len]) {
                Ok(packet) if packet.is_valid_request() => {
                    let config = self.answer(from);
                    if let Err(e) = self.reply(&config, from).await {
                        tracing::warn!(%from, error = %e, "Failed to answer discovery request");
                    }
                }
                Ok(other) => {
                    tracing::debug!(%from, ?other, "Ignoring discovery packet");
                }
                Err(e) => {
                    tracing::debug!(%from, len, error = %e, "Ignoring malformed discovery datagram");
                }
            }
        }

        tracing::info!("Resolver server stopped");
    }

    async fn reply(&self, config: &PeerConfiguration, to: SocketAddr) -> Result<()> {
        let bytes = DiscoveryPacket::Response(config.clone()).to_bytes()?;
        self.socket.send_to(&bytes, to).await?;
        tracing::info!(
            leaf = %to,
            listening_port = config.listening_port,
            peer = %config.peer_endpoint(),
            "Answered discovery request"
        );
        Ok(())
    }

    /// Build the configuration for a leaf whose request came from `from`
    pub fn answer(&mut self, from: SocketAddr) -> PeerConfiguration {
        let listening_port = self.ports.next_port();

        let (peer_address, peer_port) = match (&self.peer_selection, &self.last_joined) {
            (PeerSelection::Chain, Some((address, port))) => (address.clone(), *port),
            _ => (self.root_address(), self.root_port),
        };

        // Chaining only works when the leaf's port is known up front.
        // Recorded on answer; the root never learns whether the leaf joined.
        if listening_port != 0 {
            self.last_joined = Some((from.ip().to_string(), listening_port));
        }

        PeerConfiguration::new(listening_port, peer_address, peer_port)
    }

    fn root_address(&self) -> String {
        match (&self.advertise_address, self.network_type) {
            (Some(address), _) => address.clone(),
            (None, NetworkType::Local) => "127.0.0.1".to_string(),
            // Empty: the leaf substitutes the reply's source address
            (None, NetworkType::Public) => String::new(),
        }
    }
}
