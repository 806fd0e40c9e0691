//! Broker error types

use telephone_network::NetworkError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConnectError>;

/// Broker settings that would break deduplication
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Dedup ttl_ms must be greater than zero")]
    ZeroTtl,

    #[error("Dedup sweep_interval_ms must be greater than zero")]
    ZeroSweepInterval,
}

/// Why a node could not join the mesh
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("Node is already connecting or connected")]
    AlreadyConnected,

    #[error("Node has been shut down")]
    Closed,

    #[error("Discovery failed: {0}")]
    Discovery(#[source] NetworkError),

    #[error("Failed to listen on port {port}: {source}")]
    Listen {
        port: u16,
        #[source]
        source: NetworkError,
    },

    #[error("Failed to connect to peer {address}:{port}: {source}")]
    Dial {
        address: String,
        port: u16,
        #[source]
        source: NetworkError,
    },

    #[error("Failed to start resolver server: {0}")]
    Resolver(#[source] NetworkError),
}
