// Copyright (c) Telephone Contributors
// SPDX-License-Identifier: Apache-2.0

//! Network interface for application protocols

use crate::error::Result;
use crate::peer_manager::PeerManager;
use crate::session::{Inbound, SessionId};
use async_trait::async_trait;
use std::net::SocketAddr;
use telephone_types::Message;
use tokio_util::sync::CancellationToken;

/// What the message broker needs from the peer network
#[async_trait]
pub trait NetworkInterface: Send + Sync {
    /// Accept peers on `port` (0 picks a free port)
    async fn start_listening(&self, port: u16) -> Result<SocketAddr>;

    /// Stop accepting on `addr`; returns false if nothing was bound there
    fn stop_listening(&self, addr: SocketAddr) -> bool;

    /// Addresses currently accepting peers
    fn listening_addrs(&self) -> Vec<SocketAddr>;

    /// Dial a peer and register the session
    async fn connect(&self, address: &str, port: u16) -> Result<SessionId>;

    /// Close one session
    fn disconnect(&self, session_id: SessionId) -> Result<()>;

    /// Send a locally originated message to every neighbour
    fn post_outbound(&self, message: Message) -> usize;

    /// Relay a message that arrived on `origin`
    fn forward(&self, message: Message, origin: SessionId) -> usize;

    /// Wait for the next message from any session
    async fn next_inbound(&self, cancel: &CancellationToken) -> Result<Inbound>;

    /// Number of live sessions
    fn session_count(&self) -> usize;

    /// Close every listener and session
    async fn shutdown(&self);
}

#[async_trait]
impl NetworkInterface for PeerManager {
    async fn start_listening(&self, port: u16) -> Result<SocketAddr> {
        PeerManager::start_listening(self, port).await
    }

    fn stop_listening(&self, addr: SocketAddr) -> bool {
        PeerManager::stop_listening(self, addr)
    }

    fn listening_addrs(&self) -> Vec<SocketAddr> {
        PeerManager::listening_addrs(self)
    }

    async fn connect(&self, address: &str, port: u16) -> Result<SessionId> {
        PeerManager::connect(self, address, port).await
    }

    fn disconnect(&self, session_id: SessionId) -> Result<()> {
        PeerManager::disconnect(self, session_id)
    }

    fn post_outbound(&self, message: Message) -> usize {
        PeerManager::post_outbound(self, message)
    }

    fn forward(&self, message: Message, origin: SessionId) -> usize {
        PeerManager::forward(self, message, origin)
    }

    async fn next_inbound(&self, cancel: &CancellationToken) -> Result<Inbound> {
        PeerManager::next_inbound(self, cancel).await
    }

    fn session_count(&self) -> usize {
        PeerManager::session_count(self)
    }

    async fn shutdown(&self) {
        PeerManager::shutdown(self).await
    }
}
