// Copyright (c) Telephone Contributors
// SPDX-License-Identifier: Apache-2.0

//! One-shot resolver used by a joining leaf

use super::{DiscoveryConfig, DiscoveryPacket};
use crate::constants::MAX_DATAGRAM_SIZE;
use crate::error::{NetworkError, Result};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use telephone_types::{NetworkType, PeerConfiguration};
use tokio::net::UdpSocket;

/// Asks the root where a new leaf fits in the mesh
#[derive(Debug, Clone)]
pub struct Resolver {
    config: DiscoveryConfig,
}

impl Resolver {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Send one request and wait for the root's answer.
    ///
    /// Fails with [`NetworkError::DiscoveryFailed`] when nothing valid arrives
    /// before the discovery timeout.
    pub async fn resolve(&self) -> Result<PeerConfiguration> {
        let target = self.target().await?;
        let bind_ip = match self.config.network_type {
            NetworkType::Local => IpAddr::V4(Ipv4Addr::LOCALHOST),
            NetworkType::Public => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        };

        let socket = UdpSocket::bind(SocketAddr::new(bind_ip, 0))
            .await
            .map_err(|e| NetworkError::DiscoveryFailed(format!("bind: {}", e)))?;

        if target.ip() == IpAddr::V4(Ipv4Addr::BROADCAST) {
            socket
                .set_broadcast(true)
                .map_err(|e| NetworkError::DiscoveryFailed(format!("broadcast: {}", e)))?;
        }

        let request = DiscoveryPacket::request().to_bytes()?;
        socket
            .send_to(&request, target)
            .await
            .map_err(|e| NetworkError::DiscoveryFailed(format!("send to {}: {}", target, e)))?;

        tracing::info!(%target, timeout_ms = self.config.discovery_timeout_ms, "Discovery request sent");

        let timeout = self.config.discovery_timeout();
        match tokio::time::timeout(timeout, Self::await_response(&socket)).await {
            Ok(result) => result,
            Err(_) => Err(NetworkError::DiscoveryFailed(format!(
                "no answer from {} within {:?}",
                target, timeout
            ))),
        }
    }

    async fn await_response(socket: &UdpSocket) -> Result<PeerConfiguration> {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let (len, from) = socket
            .recv_from(&mut buf)
            .await
            .map_err(|e| NetworkError::DiscoveryFailed(format!("receive: {}", e)))?;

        match DiscoveryPacket::from_bytes(&buf[..len]) {
            Ok(DiscoveryPacket::Response(mut config)) => {
                if Self::needs_source_address(&config.peer_address) {
                    config.peer_address = from.ip().to_string();
                }
                tracing::info!(
                    root = %from,
                    listening_port = config.listening_port,
                    peer = %config.peer_endpoint(),
                    "Discovery answered"
                );
                Ok(config)
            }
            Ok(other) => Err(NetworkError::DiscoveryFailed(format!(
                "unexpected packet from {}: {:?}",
                from, other
            ))),
            Err(e) => Err(NetworkError::DiscoveryFailed(format!(
                "malformed answer from {}: {}",
                from, e
            ))),
        }
    }

    fn needs_source_address(address: &str) -> bool {
        address.is_empty()
            || address
                .parse::<IpAddr>()
                .map(|ip| ip.is_unspecified())
                .unwrap_or(false)
    }

    async fn target(&self) -> Result<SocketAddr> {
        let port = self.config.discovery_port;

        if let Some(host) = &self.config.root_address {
            return tokio::net::lookup_host((host.as_str(), port))
                .await
                .map_err(|e| NetworkError::HostResolution(format!("{}: {}", host, e)))?
                .find(|addr| addr.is_ipv4())
                .ok_or_else(|| {
                    NetworkError::HostResolution(format!("{} has no IPv4 address", host))
                });
        }

        let ip = match self.config.network_type {
            NetworkType::Local => Ipv4Addr::LOCALHOST,
            NetworkType::Public => Ipv4Addr::BROADCAST,
        };
        Ok(SocketAddr::new(IpAddr::V4(ip), port))
    }
}
