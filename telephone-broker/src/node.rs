//! Role-based connect state machine
//!
//! ```text
//!   Idle ──connect──▶ Connecting ──ok──▶ Connected(role)
//!                         │
//!                         └──err──▶ Failed ──connect──▶ Connecting ...
//!
//!   any ──shutdown──▶ Closed
//! ```
//!
//! A root listens on the root port and answers discovery. A leaf discovers
//! its configuration, listens where it was told and dials the peer it was
//! given. A failed leaf join closes everything it opened. A node that has
//! been shut down stays closed.

use crate::display::MessageDisplay;
use crate::error::{ConnectError, Result};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use telephone_network::{NetworkConfig, NetworkInterface, Resolver, ResolverServer, SessionId};
use telephone_types::{NodeRole, PeerConfiguration};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Connection state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectState {
    Idle,
    Connecting,
    Connected(NodeRole),
    Failed,
    /// Shut down; further connects are rejected
    Closed,
}

/// What a successful connect opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Connected {
    Root {
        listen_addr: SocketAddr,
        discovery_addr: SocketAddr,
    },
    Leaf {
        listen_addr: SocketAddr,
        peer_session: SessionId,
        config: PeerConfiguration,
    },
}

impl Connected {
    pub fn role(&self) -> NodeRole {
        match self {
            Connected::Root { .. } => NodeRole::RootNode,
            Connected::Leaf { .. } => NodeRole::LeafNode,
        }
    }

    pub fn listen_addr(&self) -> SocketAddr {
        match self {
            Connected::Root { listen_addr, .. } | Connected::Leaf { listen_addr, .. } => {
                *listen_addr
            }
        }
    }
}

/// A node joining the mesh in a fixed role
pub struct Node {
    network: Arc<dyn NetworkInterface>,
    config: NetworkConfig,
    display: Arc<dyn MessageDisplay>,
    state: watch::Sender<ConnectState>,
    /// Stops the root's resolver server
    cancel: CancellationToken,
    resolver_task: Mutex<Option<JoinHandle<()>>>,
}

impl Node {
    pub fn new(
        network: Arc<dyn NetworkInterface>,
        config: NetworkConfig,
        display: Arc<dyn MessageDisplay>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectState::Idle);
        Self {
            network,
            config,
            display,
            state,
            cancel: CancellationToken::new(),
            resolver_task: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectState {
        *self.state.borrow()
    }

    /// Watch state transitions
    pub fn subscribe(&self) -> watch::Receiver<ConnectState> {
        self.state.subscribe()
    }

    pub fn network(&self) -> &Arc<dyn NetworkInterface> {
        &self.network
    }

    /// Join the mesh as `role`.
    ///
    /// `root_address` sends a leaf's discovery request to that host instead
    /// of the configured target. Rejected while connecting or connected, and
    /// after [`Node::shutdown`].
    pub async fn connect(
        &self,
        role: NodeRole,
        root_address: Option<String>,
    ) -> Result<Connected> {
        let mut previous = ConnectState::Idle;
        let claimed = self.state.send_if_modified(|state| {
            previous = *state;
            match state {
                ConnectState::Connecting | ConnectState::Connected(_) | ConnectState::Closed => {
                    false
                }
                ConnectState::Idle | ConnectState::Failed => {
                    *state = ConnectState::Connecting;
                    true
                }
            }
        });
        if !claimed {
            return Err(match previous {
                ConnectState::Closed => ConnectError::Closed,
                _ => ConnectError::AlreadyConnected,
            });
        }

        info!(%role, "Connecting");
        let result = match role {
            NodeRole::RootNode => self.connect_root().await,
            NodeRole::LeafNode => self.connect_leaf(root_address).await,
        };

        match &result {
            Ok(connected) => {
                if !self.finish_connect(ConnectState::Connected(role)) {
                    // Shut down while connecting
                    self.network.stop_listening(connected.listen_addr());
                    return Err(ConnectError::Closed);
                }
                info!(%role, listen_addr = %connected.listen_addr(), "Connected");
            }
            Err(e) => {
                warn!(%role, error = %e, "Connect failed");
                self.finish_connect(ConnectState::Failed);
                self.display.on_connect_failed();
            }
        }
        result
    }

    /// Leave `Connecting`, unless a shutdown already closed the node
    fn finish_connect(&self, next: ConnectState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == ConnectState::Closed {
                return false;
            }
            *state = next;
            true
        })
    }

    async fn connect_root(&self) -> Result<Connected> {
        let port = self.config.root_port;
        let listen_addr = self
            .network
            .start_listening(port)
            .await
            .map_err(|source| ConnectError::Listen { port, source })?;

        let server = match ResolverServer::bind(&self.config.discovery, listen_addr.port()).await {
            Ok(server) => server,
            Err(e) => {
                self.network.stop_listening(listen_addr);
                return Err(ConnectError::Resolver(e));
            }
        };
        let discovery_addr = match server.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                self.network.stop_listening(listen_addr);
                return Err(ConnectError::Resolver(e));
            }
        };

        let handle = server.spawn(self.cancel.child_token());
        *self.resolver_task.lock() = Some(handle);

        Ok(Connected::Root {
            listen_addr,
            discovery_addr,
        })
    }

    async fn connect_leaf(&self, root_address: Option<String>) -> Result<Connected> {
        let mut discovery = self.config.discovery.clone();
        if root_address.is_some() {
            discovery.root_address = root_address;
        }

        let config = Resolver::new(discovery)
            .resolve()
            .await
            .map_err(ConnectError::Discovery)?;

        let port = config.listening_port;
        let listen_addr = self
            .network
            .start_listening(port)
            .await
            .map_err(|source| ConnectError::Listen { port, source })?;

        match self
            .network
            .connect(&config.peer_address, config.peer_port)
            .await
        {
            Ok(peer_session) => Ok(Connected::Leaf {
                listen_addr,
                peer_session,
                config,
            }),
            Err(source) => {
                self.network.stop_listening(listen_addr);
                Err(ConnectError::Dial {
                    address: config.peer_address,
                    port: config.peer_port,
                    source,
                })
            }
        }
    }

    /// Stop the resolver server and close every listener and session.
    ///
    /// The node moves to [`ConnectState::Closed`] and cannot connect again.
    pub async fn shutdown(&self) {
        self.state.send_replace(ConnectState::Closed);
        self.cancel.cancel();
        let handle = self.resolver_task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Resolver server task failed");
            }
        }
        self.network.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::NoopDisplay;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use telephone_network::DiscoveryConfig;
    use tokio::net::UdpSocket;

    #[derive(Default)]
    struct FailureCounter(AtomicUsize);

    impl MessageDisplay for FailureCounter {
        fn on_message_refined(&self, _original: &str, _refined: &str, _hops: u32) {}

        fn on_connect_failed(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn loopback_config() -> NetworkConfig {
        let mut config = NetworkConfig::default();
        config.root_port = 0;
        config.transport.bind_address = "127.0.0.1".to_string();
        config.discovery = DiscoveryConfig {
            discovery_port: 0,
            discovery_timeout_ms: 200,
            leaf_port_base: Some(0),
            ..Default::default()
        };
        config
    }

    #[tokio::test]
    async fn test_root_connect_and_reject_second() {
        let config = loopback_config();
        let node = Node::new(Arc::new(config.peer_manager()), config, Arc::new(NoopDisplay));
        let mut states = node.subscribe();

        let connected = node.connect(NodeRole::RootNode, None).await.unwrap();
        assert_eq!(connected.role(), NodeRole::RootNode);
        assert_eq!(node.state(), ConnectState::Connected(NodeRole::RootNode));
        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), ConnectState::Connected(NodeRole::RootNode));

        let err = node.connect(NodeRole::LeafNode, None).await.unwrap_err();
        assert!(matches!(err, ConnectError::AlreadyConnected));
        assert_eq!(node.state(), ConnectState::Connected(NodeRole::RootNode));

        node.shutdown().await;
        assert_eq!(node.state(), ConnectState::Closed);
    }

    #[tokio::test]
    async fn test_connect_after_shutdown_rejected() {
        let config = loopback_config();
        let node = Node::new(Arc::new(config.peer_manager()), config, Arc::new(NoopDisplay));

        node.connect(NodeRole::RootNode, None).await.unwrap();
        node.shutdown().await;
        assert!(node.network().listening_addrs().is_empty());

        let err = node.connect(NodeRole::RootNode, None).await.unwrap_err();
        assert!(matches!(err, ConnectError::Closed));
        assert_eq!(node.state(), ConnectState::Closed);
        assert!(node.network().listening_addrs().is_empty());
        assert!(node.resolver_task.lock().is_none());

        // Shutting down twice is harmless
        node.shutdown().await;
        assert_eq!(node.state(), ConnectState::Closed);
    }

    #[tokio::test]
    async fn test_leaf_discovery_timeout_tears_down() {
        // Nobody answers on this port
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut config = loopback_config();
        config.discovery.discovery_port = silent.local_addr().unwrap().port();

        let display = Arc::new(FailureCounter::default());
        let node = Node::new(Arc::new(config.peer_manager()), config, display.clone());

        let started = std::time::Instant::now();
        let err = node.connect(NodeRole::LeafNode, None).await.unwrap_err();
        assert!(matches!(err, ConnectError::Discovery(_)));
        assert!(started.elapsed() < Duration::from_secs(2));

        assert_eq!(node.state(), ConnectState::Failed);
        assert_eq!(display.0.load(Ordering::SeqCst), 1);
        assert!(node.network().listening_addrs().is_empty());
        assert_eq!(node.network().session_count(), 0);
    }

    #[tokio::test]
    async fn test_leaf_dial_failure_closes_listener() {
        // Answer discovery with a peer that refuses connections
        let fake_root = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut config = loopback_config();
        config.discovery.discovery_port = fake_root.local_addr().unwrap().port();

        let closed_port = {
            let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            probe.local_addr().unwrap().port()
        };
        let responder = tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let (_, from) = fake_root.recv_from(&mut buf).await.unwrap();
            let answer = telephone_network::DiscoveryPacket::Response(PeerConfiguration::new(
                0,
                "127.0.0.1",
                closed_port,
            ));
            fake_root
                .send_to(&answer.to_bytes().unwrap(), from)
                .await
                .unwrap();
        });

        let display = Arc::new(FailureCounter::default());
        let node = Node::new(Arc::new(config.peer_manager()), config, display.clone());

        let err = node.connect(NodeRole::LeafNode, None).await.unwrap_err();
        assert!(matches!(err, ConnectError::Dial { .. }));
        assert!(node.network().listening_addrs().is_empty());
        assert_eq!(display.0.load(Ordering::SeqCst), 1);
        responder.await.unwrap();

        // A failed node may try again
        let again = node.connect(NodeRole::RootNode, None).await;
        assert!(again.is_ok());
        node.shutdown().await;
    }
}
