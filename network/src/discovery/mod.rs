// Copyright (c) Telephone Contributors
// SPDX-License-Identifier: Apache-2.0

//! Root/leaf discovery over UDP broadcast
//!
//! A root node answers discovery requests with a [`PeerConfiguration`]
//! telling the joining leaf which port to listen on and which existing peer
//! to dial. A leaf sends one request and waits a bounded time for the answer.
//!
//! ## Architecture
//!
//! ```text
//!   Leaf                                   Root
//! ┌──────────────┐   Request{magic}    ┌──────────────────┐
//! │   Resolver   │ ──── broadcast ───▶ │  ResolverServer  │
//! │  (one shot,  │                     │  - PortAllocator │
//! │   timeout)   │ ◀──── unicast ───── │  - PeerSelection │
//! └──────────────┘  Response(config)   └──────────────────┘
//! ```

mod client;
mod server;

pub use client::Resolver;
pub use server::{PortAllocator, ResolverServer};

use crate::constants::{
    DEFAULT_DISCOVERY_PORT, DISCOVERY_MAGIC, DISCOVERY_TIMEOUT, NETWORK_PROTOCOL_VERSION,
};
use crate::error::{NetworkError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use telephone_types::{NetworkType, PeerConfiguration};

/// Datagram exchanged by the resolver and its server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscoveryPacket {
    /// Leaf asking for a place in the mesh
    Request { magic: u32, version: u32 },
    /// Root's answer
    Response(PeerConfiguration),
}

impl DiscoveryPacket {
    pub fn request() -> Self {
        DiscoveryPacket::Request {
            magic: DISCOVERY_MAGIC,
            version: NETWORK_PROTOCOL_VERSION,
        }
    }

    /// Whether this is a request this node version can answer
    pub fn is_valid_request(&self) -> bool {
        matches!(
            self,
            DiscoveryPacket::Request { magic, version }
                if *magic == DISCOVERY_MAGIC && *version == NETWORK_PROTOCOL_VERSION
        )
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(NetworkError::from)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| NetworkError::DeserializationError(e.to_string()))
    }
}

/// Existing peer a new leaf is told to dial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerSelection {
    /// Always the root itself (star around the root)
    #[default]
    Root,
    /// The most recently answered leaf (a line through every node).
    ///
    /// The root records a leaf when it answers, not when the leaf joins. A
    /// leaf that never binds or dials still becomes the next leaf's peer, and
    /// that leaf's dial then fails. Falls back to the root while leaf ports
    /// are ephemeral.
    Chain,
}

/// Configuration for discovery
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Loopback-only or LAN broadcast
    pub network_type: NetworkType,

    /// UDP port the root's resolver listens on
    pub discovery_port: u16,

    /// How long a leaf waits for an answer (ms)
    pub discovery_timeout_ms: u64,

    /// Send the request to this host instead of broadcasting
    pub root_address: Option<String>,

    /// Address the root puts into its answers; the leaf falls back to the
    /// reply's source address when unset on a public network
    pub advertise_address: Option<String>,

    /// First listening port handed to leaves; defaults to the root port + 1.
    /// 0 lets every leaf pick a free port.
    pub leaf_port_base: Option<u16>,

    pub peer_selection: PeerSelection,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            network_type: NetworkType::default(),
            discovery_port: DEFAULT_DISCOVERY_PORT,
            discovery_timeout_ms: DISCOVERY_TIMEOUT.as_millis() as u64,
            root_address: None,
            advertise_address: None,
            leaf_port_base: None,
            peer_selection: PeerSelection::default(),
        }
    }
}

impl DiscoveryConfig {
    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_validation() {
        assert!(DiscoveryPacket::request().is_valid_request());

        let stale = DiscoveryPacket::Request {
            magic: DISCOVERY_MAGIC,
            version: NETWORK_PROTOCOL_VERSION + 1,
        };
        assert!(!stale.is_valid_request());

        let response = DiscoveryPacket::Response(PeerConfiguration::new(1, "a", 2));
        assert!(!response.is_valid_request());
    }

    #[test]
    fn test_packet_bytes() {
        let packet = DiscoveryPacket::Response(PeerConfiguration::new(9000, "10.0.0.2", 8050));
        let decoded = DiscoveryPacket::from_bytes(&packet.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, packet);

        assert!(DiscoveryPacket::from_bytes(&[0xff, 0xff]).is_err());
    }

    #[test]
    fn test_default_config() {
        let config = DiscoveryConfig::default();
        assert_eq!(config.discovery_port, 8050);
        assert_eq!(config.discovery_timeout(), Duration::from_secs(3));
        assert_eq!(config.peer_selection, PeerSelection::Root);
    }
}
