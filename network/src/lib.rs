// Copyright (c) Telephone Contributors
// SPDX-License-Identifier: Apache-2.0

//! # Telephone Network Module
//!
//! Peer-to-peer plumbing for the telephone mesh: TCP sessions carrying
//! length-prefixed frames, a peer manager that floods messages to every
//! neighbour, and UDP discovery so leaves can find the root.
//!
//! ## Architecture
//!
//! - **PeerManager**: Owns listeners and sessions, floods outbound messages
//! - **Session**: One TCP link with a reader and a writer task
//! - **Transport**: Listening and dialing over TCP
//! - **Protocols**: Wire messages and the frame codec
//! - **Discovery**: Root-side resolver server and leaf-side resolver

pub mod application;
pub mod constants;
pub mod counters;
pub mod discovery;
pub mod error;
pub mod peer_manager;
pub mod protocols;
pub mod session;
pub mod transport;

pub use application::NetworkInterface;
pub use counters::{MetricsSnapshot, NetworkMetrics};
pub use discovery::{
    DiscoveryConfig, DiscoveryPacket, PeerSelection, PortAllocator, Resolver, ResolverServer,
};
pub use error::{NetworkError, Result};
pub use peer_manager::{FloodPolicy, PeerManager, PeerManagerConfig};
pub use protocols::NetworkMessage;
pub use session::{Direction, Inbound, SessionId, SessionInfo};
pub use transport::{Connection, TcpTransport, TransportConfig};

use serde::{Deserialize, Serialize};

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Port the root node accepts peers on
    pub root_port: u16,

    pub transport: TransportConfig,
    pub peer_manager: PeerManagerConfig,
    pub discovery: DiscoveryConfig,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            root_port: constants::DEFAULT_ROOT_PORT,
            transport: TransportConfig::default(),
            peer_manager: PeerManagerConfig::default(),
            discovery: DiscoveryConfig::default(),
        }
    }
}

impl NetworkConfig {
    /// Build a peer manager from this configuration
    pub fn peer_manager(&self) -> PeerManager {
        PeerManager::new(
            self.peer_manager.clone(),
            TcpTransport::new(self.transport.clone()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NetworkConfig::default();
        assert_eq!(config.root_port, 8050);
        assert_eq!(config.discovery.discovery_port, 8050);
        assert_eq!(config.peer_manager.flood_policy, FloodPolicy::ExcludeOrigin);
        assert_eq!(config.transport.bind_address, "0.0.0.0");
    }
}
