// Copyright (c) Telephone Contributors
// SPDX-License-Identifier: Apache-2.0

//! Peer manager for managing peer connections
//!
//! Owns the listeners, the live set of sessions and the shared inbound queue.
//! Broadcasting enqueues onto every session's outbound queue; the dedup cache
//! upstream, not the topology, is what keeps floods from looping.

use crate::{
    counters::NetworkMetrics,
    error::{NetworkError, Result},
    protocols::NetworkMessage,
    session::{Inbound, Session, SessionContext, SessionId, SessionInfo},
    transport::{Connection, TcpTransport},
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use telephone_types::Message;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// Pause after a failed accept so a persistent error does not spin
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Which neighbours receive a relayed message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FloodPolicy {
    /// Every neighbour except the one the message came from
    #[default]
    ExcludeOrigin,
    /// Every neighbour, including the sender
    AllNeighbours,
}

/// Peer manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerManagerConfig {
    /// Upper bound on live sessions, inbound and outbound together
    pub max_sessions: usize,
    /// Largest payload accepted or sent on a session, in bytes
    pub max_frame_size: usize,
    pub flood_policy: FloodPolicy,
}

impl Default for PeerManagerConfig {
    fn default() -> Self {
        Self {
            max_sessions: crate::constants::MAX_SESSIONS,
            max_frame_size: crate::constants::MAX_FRAME_SIZE,
            flood_policy: FloodPolicy::default(),
        }
    }
}

/// Peer manager for managing all peer connections
#[derive(Clone)]
pub struct PeerManager {
    /// Live sessions indexed by session ID
    sessions: Arc<DashMap<SessionId, Arc<Session>>>,

    /// Running accept loops by bound address
    listeners: Arc<DashMap<SocketAddr, CancellationToken>>,

    next_session_id: Arc<AtomicU64>,

    /// Serializes the session limit check with the insert
    admission: Arc<parking_lot::Mutex<()>>,

    inbound_tx: mpsc::UnboundedSender<Inbound>,
    inbound_rx: Arc<Mutex<mpsc::UnboundedReceiver<Inbound>>>,

    transport: TcpTransport,
    config: PeerManagerConfig,
    metrics: NetworkMetrics,

    /// Parent of every listener and session token
    shutdown: CancellationToken,
}

impl PeerManager {
    /// Create a new peer manager
    pub fn new(config: PeerManagerConfig, transport: TcpTransport) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        Self {
            sessions: Arc::new(DashMap::new()),
            listeners: Arc::new(DashMap::new()),
            next_session_id: Arc::new(AtomicU64::new(1)),
            admission: Arc::new(parking_lot::Mutex::new(())),
            inbound_tx,
            inbound_rx: Arc::new(Mutex::new(inbound_rx)),
            transport,
            config,
            metrics: NetworkMetrics::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Start accepting peers on `port` (0 picks a free port).
    ///
    /// Bind errors are returned; errors on individual accepts are logged and
    /// the listener keeps running.
    pub async fn start_listening(&self, port: u16) -> Result<SocketAddr> {
        let listener = self.transport.listen(port).await?;
        let local_addr = listener.local_addr()?;

        let token = self.shutdown.child_token();
        self.listeners.insert(local_addr, token.clone());

        let manager = self.clone();
        tokio::spawn(async move {
            manager.accept_loop(listener, local_addr, token).await;
        });

        Ok(local_addr)
    }

    /// Stop the accept loop bound to `addr`. Established sessions stay up.
    pub fn stop_listening(&self, addr: SocketAddr) -> bool {
        match self.listeners.remove(&addr) {
            Some((_, token)) => {
                token.cancel();
                tracing::info!(%addr, "Stopped listening");
                true
            }
            None => false,
        }
    }

    /// Addresses of the running listeners
    pub fn listening_addrs(&self) -> Vec<SocketAddr> {
        self.listeners.iter().map(|entry| *entry.key()).collect()
    }

    async fn accept_loop(&self, listener: TcpListener, addr: SocketAddr, token: CancellationToken) {
        tracing::info!(%addr, "Connection acceptor started");

        loop {
            let accepted = tokio::select! {
                _ = token.cancelled() => break,
                accepted = self.transport.accept(&listener) => accepted,
            };

            match accepted {
                Ok(connection) => {
                    let remote = connection.metadata.remote_addr;
                    match self.register(connection) {
                        Ok(session_id) => {
                            tracing::info!(session_id, %remote, "Accepted peer");
                        }
                        Err(e) => {
                            tracing::warn!(%remote, error = %e, "Rejected inbound peer");
                        }
                    }
                }
                Err(e) => {
                    self.metrics.inc_failed_connections();
                    tracing::warn!(%addr, error = %e, "Failed to accept connection");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            }
        }

        // A newer listener may have taken the address after a stop
        self.listeners.remove_if(&addr, |_, t| t.is_cancelled());
        tracing::debug!(%addr, "Connection acceptor stopped");
    }

    /// Dial a peer and register the resulting session
    pub async fn connect(&self, address: &str, port: u16) -> Result<SessionId> {
        if self.sessions.len() >= self.config.max_sessions {
            return Err(NetworkError::MaxPeersReached(self.config.max_sessions));
        }

        tracing::info!(%address, port, "Connecting to peer");
        let connection = self.transport.dial(address, port).await.map_err(|e| {
            self.metrics.inc_failed_connections();
            e
        })?;

        let session_id = self.register(connection)?;
        tracing::info!(session_id, %address, port, "Connected to peer");
        Ok(session_id)
    }

    fn register(&self, connection: Connection) -> Result<SessionId> {
        let (metadata, stream) = connection.into_parts();

        let (id, session, outbound_rx) = {
            let _admission = self.admission.lock();
            if self.sessions.len() >= self.config.max_sessions {
                self.metrics.inc_failed_connections();
                return Err(NetworkError::MaxPeersReached(self.config.max_sessions));
            }

            let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
            let info = SessionInfo::new(id, metadata.remote_addr, metadata.is_inbound);
            let (session, outbound_rx) = Session::open(info, self.shutdown.child_token());
            // Insert before the tasks run so an early close always finds the entry
            self.sessions.insert(id, session.clone());
            (id, session, outbound_rx)
        };
        self.metrics.inc_connections(metadata.is_inbound);

        let sessions = self.sessions.clone();
        let metrics = self.metrics.clone();
        let ctx = SessionContext {
            inbound_tx: self.inbound_tx.clone(),
            max_frame_size: self.config.max_frame_size,
            metrics: self.metrics.clone(),
            on_close: Arc::new(move |id| {
                remove_session(&sessions, &metrics, id);
            }),
        };
        session.start(stream, outbound_rx, ctx);

        Ok(id)
    }

    /// Close one session
    pub fn disconnect(&self, session_id: SessionId) -> Result<()> {
        let session = remove_session(&self.sessions, &self.metrics, session_id)
            .ok_or(NetworkError::SessionNotFound(session_id))?;
        session.close();
        Ok(())
    }

    /// Enqueue `message` on every live session except `exclude`.
    ///
    /// Returns the number of sessions it was queued on.
    pub fn broadcast(&self, message: &Message, exclude: Option<SessionId>) -> usize {
        // Snapshot first so no shard guard is held while enqueueing
        let targets: Vec<Arc<Session>> = self
            .sessions
            .iter()
            .filter(|entry| Some(*entry.key()) != exclude)
            .map(|entry| entry.value().clone())
            .collect();

        let mut sent = 0;
        for session in targets {
            if session.enqueue(NetworkMessage::broadcast(message.clone())) {
                sent += 1;
            }
        }

        tracing::debug!(message_id = %message.id(), sent, ?exclude, "Broadcast queued");
        sent
    }

    /// Relay a message that arrived on `origin`, honouring the flood policy
    pub fn forward(&self, message: Message, origin: SessionId) -> usize {
        let exclude = match self.config.flood_policy {
            FloodPolicy::ExcludeOrigin => Some(origin),
            FloodPolicy::AllNeighbours => None,
        };
        self.broadcast(&message, exclude)
    }

    /// Flood a locally composed message to every neighbour
    pub fn post_outbound(&self, message: Message) -> usize {
        self.broadcast(&message, None)
    }

    /// Wait for the next message from any session, in arrival order
    pub async fn next_inbound(&self, cancel: &CancellationToken) -> Result<Inbound> {
        let receive = async {
            let mut rx = self.inbound_rx.lock().await;
            rx.recv().await
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(NetworkError::Cancelled),
            _ = self.shutdown.cancelled() => Err(NetworkError::Cancelled),
            // the manager keeps a sender alive, so `None` only follows teardown
            inbound = receive => inbound.ok_or(NetworkError::Cancelled),
        }
    }

    /// Get a session by ID
    pub fn session(&self, session_id: SessionId) -> Option<SessionInfo> {
        self.sessions
            .get(&session_id)
            .map(|entry| entry.value().info().clone())
    }

    /// Get all live sessions
    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.sessions
            .iter()
            .map(|entry| entry.value().info().clone())
            .collect()
    }

    /// Get session count
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn metrics(&self) -> &NetworkMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &PeerManagerConfig {
        &self.config
    }

    /// Stop every listener and session and wait for their tasks
    pub async fn shutdown(&self) {
        tracing::info!(sessions = self.sessions.len(), "Shutting down peer manager");
        self.shutdown.cancel();

        let sessions: Vec<Arc<Session>> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for session in sessions {
            session.wait_closed().await;
        }
        self.listeners.clear();
    }
}

fn remove_session(
    sessions: &DashMap<SessionId, Arc<Session>>,
    metrics: &NetworkMetrics,
    id: SessionId,
) -> Option<Arc<Session>> {
    let (_, session) = sessions.remove(&id)?;
    metrics.dec_active_connections();
    tracing::info!(
        session_id = id,
        remote = %session.info().remote_addr,
        direction = %session.info().direction,
        "Session closed"
    );
    Some(session)
}
