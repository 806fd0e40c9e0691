// Copyright (c) Telephone Contributors
// SPDX-License-Identifier: Apache-2.0

//! Network error types

use thiserror::Error;

/// Network result type
pub type Result<T> = std::result::Result<T, NetworkError>;

/// Network error types
#[derive(Debug, Error)]
pub enum NetworkError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Could not open a listening socket
    #[error("Failed to bind port {port}: {source}")]
    BindFailed {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// Connection error
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Host name did not resolve to any address
    #[error("Host resolution failed: {0}")]
    HostResolution(String),

    /// Session not found
    #[error("Session not found: {0}")]
    SessionNotFound(u64),

    /// Maximum sessions reached
    #[error("Maximum peers reached: {0}")]
    MaxPeersReached(usize),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// Timeout error
    #[error("Timeout error: {0}")]
    TimeoutError(String),

    /// Invalid message
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// No root answered, or the answer was unusable
    #[error("Peer discovery failed: {0}")]
    DiscoveryFailed(String),

    /// Blocking receive was cancelled
    #[error("Operation cancelled")]
    Cancelled,
}

impl From<bincode::Error> for NetworkError {
    fn from(err: bincode::Error) -> Self {
        NetworkError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(matches!(NetworkError::from(io), NetworkError::IoError(_)));

        let bad = bincode::deserialize::<String>(&[0xff]).unwrap_err();
        assert!(matches!(
            NetworkError::from(bad),
            NetworkError::SerializationError(_)
        ));
    }
}
