//! End-to-end mesh tests over loopback sockets
//!
//! Every node binds ephemeral ports, so tests can run in parallel.

use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use telephone_broker::{
    BrokerConfig, ConnectState, Connected, MessageBroker, MessageDisplay, Node, UppercaseRefiner,
};
use telephone_network::{DiscoveryConfig, FloodPolicy, NetworkConfig, PeerManager};
use telephone_types::NodeRole;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Initialize tracing for tests
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

#[derive(Default)]
struct RecordingDisplay {
    refined: Mutex<Vec<(String, String, u32)>>,
}

impl RecordingDisplay {
    fn refined(&self) -> Vec<(String, String, u32)> {
        self.refined.lock().clone()
    }
}

impl MessageDisplay for RecordingDisplay {
    fn on_message_refined(&self, original: &str, refined: &str, hops: u32) {
        self.refined
            .lock()
            .push((original.to_string(), refined.to_string(), hops));
    }
}

/// One running node: network, broker loop and what it displayed
struct TestNode {
    network: Arc<PeerManager>,
    broker: Arc<MessageBroker>,
    display: Arc<RecordingDisplay>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl TestNode {
    fn start(network: Arc<PeerManager>) -> Self {
        let display = Arc::new(RecordingDisplay::default());
        let broker = MessageBroker::new(
            network.clone(),
            Arc::new(UppercaseRefiner),
            display.clone(),
            BrokerConfig::default(),
        )
        .unwrap();
        let broker = Arc::new(broker);

        let cancel = CancellationToken::new();
        let task = {
            let broker = broker.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                broker.run(cancel).await.unwrap();
            })
        };

        Self {
            network,
            broker,
            display,
            cancel,
            task,
        }
    }

    async fn stop(self) {
        self.cancel.cancel();
        self.task.await.unwrap();
        self.network.shutdown().await;
    }
}

fn loopback_config(policy: FloodPolicy) -> NetworkConfig {
    let mut config = NetworkConfig::default();
    config.root_port = 0;
    config.transport.bind_address = "127.0.0.1".to_string();
    config.peer_manager.flood_policy = policy;
    config.discovery = DiscoveryConfig {
        discovery_port: 0,
        discovery_timeout_ms: 1000,
        leaf_port_base: Some(0),
        ..Default::default()
    };
    config
}

fn manager(policy: FloodPolicy) -> Arc<PeerManager> {
    Arc::new(loopback_config(policy).peer_manager())
}

async fn wait_until<F>(what: &str, mut check: F)
where
    F: FnMut() -> bool,
{
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {}", what);
}

async fn link(from: &PeerManager, to: SocketAddr) {
    from.connect("127.0.0.1", to.port()).await.unwrap();
}

#[tokio::test]
async fn test_line_refines_once_per_hop() {
    init_tracing();

    let a = TestNode::start(manager(FloodPolicy::ExcludeOrigin));
    let b = TestNode::start(manager(FloodPolicy::ExcludeOrigin));
    let c = TestNode::start(manager(FloodPolicy::ExcludeOrigin));

    let b_addr = b.network.start_listening(0).await.unwrap();
    link(&a.network, b_addr).await;
    link(&c.network, b_addr).await;
    wait_until("b to see both peers", || b.network.session_count() == 2).await;

    let id = a.broker.send_text("hello");

    wait_until("c to refine", || !c.display.refined().is_empty()).await;

    assert_eq!(
        b.display.refined(),
        vec![("hello".to_string(), "HELLO".to_string(), 1)]
    );
    assert_eq!(
        c.display.refined(),
        vec![("HELLO".to_string(), "HELLO".to_string(), 2)]
    );
    assert!(a.display.refined().is_empty());
    assert!(a.broker.dedup_cache().contains(&id));
    assert_eq!(a.broker.stats().originated, 1);

    a.stop().await;
    b.stop().await;
    c.stop().await;
}

#[tokio::test]
async fn test_origin_drops_looped_copy() {
    init_tracing();

    let a = TestNode::start(manager(FloodPolicy::AllNeighbours));
    let b = TestNode::start(manager(FloodPolicy::AllNeighbours));

    let b_addr = b.network.start_listening(0).await.unwrap();
    link(&a.network, b_addr).await;
    wait_until("b to accept", || b.network.session_count() == 1).await;

    a.broker.send_text("echo");

    wait_until("copy back at a", || a.broker.stats().duplicates >= 1).await;
    assert!(a.display.refined().is_empty());
    assert_eq!(b.broker.stats().processed, 1);

    a.stop().await;
    b.stop().await;
}

#[tokio::test]
async fn test_triangle_delivers_once() {
    init_tracing();

    let a = TestNode::start(manager(FloodPolicy::ExcludeOrigin));
    let b = TestNode::start(manager(FloodPolicy::ExcludeOrigin));
    let c = TestNode::start(manager(FloodPolicy::ExcludeOrigin));

    let b_addr = b.network.start_listening(0).await.unwrap();
    let c_addr = c.network.start_listening(0).await.unwrap();
    link(&a.network, b_addr).await;
    link(&a.network, c_addr).await;
    link(&b.network, c_addr).await;
    wait_until("c to accept", || c.network.session_count() == 2).await;

    a.broker.send_text("ring");

    // b and c each receive one copy from a and one from each other
    wait_until("duplicates at b and c", || {
        b.broker.stats().duplicates + c.broker.stats().duplicates >= 2
    })
    .await;

    assert_eq!(b.display.refined().len(), 1);
    assert_eq!(c.display.refined().len(), 1);

    a.stop().await;
    b.stop().await;
    c.stop().await;
}

#[tokio::test]
async fn test_closing_one_peer_keeps_broker_running() {
    init_tracing();

    let a = TestNode::start(manager(FloodPolicy::ExcludeOrigin));
    let b = TestNode::start(manager(FloodPolicy::ExcludeOrigin));
    let c = TestNode::start(manager(FloodPolicy::ExcludeOrigin));

    let b_addr = b.network.start_listening(0).await.unwrap();
    link(&a.network, b_addr).await;
    link(&c.network, b_addr).await;
    wait_until("b to see both peers", || b.network.session_count() == 2).await;

    a.stop().await;
    wait_until("b to drop a", || b.network.session_count() == 1).await;

    c.broker.send_text("still here");
    wait_until("b to refine", || !b.display.refined().is_empty()).await;
    assert_eq!(b.display.refined()[0].1, "STILL HERE");

    b.stop().await;
    c.stop().await;
}

#[tokio::test]
async fn test_root_and_leaves_over_discovery() {
    init_tracing();

    let root_config = loopback_config(FloodPolicy::ExcludeOrigin);
    let root_network = Arc::new(root_config.peer_manager());
    let root_node = Node::new(
        root_network.clone(),
        root_config,
        Arc::new(RecordingDisplay::default()),
    );
    let discovery_port = match root_node.connect(NodeRole::RootNode, None).await.unwrap() {
        Connected::Root { discovery_addr, .. } => discovery_addr.port(),
        other => panic!("expected root, got {:?}", other),
    };
    let root = TestNode::start(root_network);

    let mut leaves = Vec::new();
    let mut leaf_nodes = Vec::new();
    for _ in 0..2 {
        let mut config = loopback_config(FloodPolicy::ExcludeOrigin);
        config.discovery.discovery_port = discovery_port;
        let network = Arc::new(config.peer_manager());
        let node = Node::new(network.clone(), config, Arc::new(RecordingDisplay::default()));

        match node.connect(NodeRole::LeafNode, None).await.unwrap() {
            Connected::Leaf { config, .. } => {
                assert_eq!(config.peer_address, "127.0.0.1");
            }
            other => panic!("expected leaf, got {:?}", other),
        }
        assert_eq!(node.state(), ConnectState::Connected(NodeRole::LeafNode));

        leaves.push(TestNode::start(network));
        leaf_nodes.push(node);
    }
    wait_until("root to accept both leaves", || {
        root.network.session_count() == 2
    })
    .await;

    leaves[0].broker.send_text("hello");
    wait_until("second leaf to refine", || {
        !leaves[1].display.refined().is_empty()
    })
    .await;

    assert_eq!(
        root.display.refined(),
        vec![("hello".to_string(), "HELLO".to_string(), 1)]
    );
    assert_eq!(
        leaves[1].display.refined(),
        vec![("HELLO".to_string(), "HELLO".to_string(), 2)]
    );

    for node in &leaf_nodes {
        node.shutdown().await;
    }
    for leaf in leaves {
        leaf.stop().await;
    }
    root_node.shutdown().await;
    root.stop().await;
}

#[tokio::test]
async fn test_leaf_listens_on_allocated_port() {
    init_tracing();

    let leaf_port = {
        let free = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        free.local_addr().unwrap().port()
    };

    let mut root_config = loopback_config(FloodPolicy::ExcludeOrigin);
    root_config.discovery.leaf_port_base = Some(leaf_port);
    let root_network = Arc::new(root_config.peer_manager());
    let root = Node::new(
        root_network.clone(),
        root_config,
        Arc::new(RecordingDisplay::default()),
    );
    let (root_addr, discovery_port) = match root.connect(NodeRole::RootNode, None).await.unwrap() {
        Connected::Root {
            listen_addr,
            discovery_addr,
        } => (listen_addr, discovery_addr.port()),
        other => panic!("expected root, got {:?}", other),
    };

    let mut leaf_config = loopback_config(FloodPolicy::ExcludeOrigin);
    leaf_config.discovery.discovery_port = discovery_port;
    let leaf_network = Arc::new(leaf_config.peer_manager());
    let leaf = Node::new(
        leaf_network.clone(),
        leaf_config,
        Arc::new(RecordingDisplay::default()),
    );

    match leaf.connect(NodeRole::LeafNode, None).await.unwrap() {
        Connected::Leaf {
            listen_addr,
            config,
            ..
        } => {
            assert_eq!(config.listening_port, leaf_port);
            assert_eq!(listen_addr.port(), leaf_port);
            assert_eq!(config.peer_port, root_addr.port());
        }
        other => panic!("expected leaf, got {:?}", other),
    }
    assert_eq!(leaf_network.listening_addrs().len(), 1);
    assert_eq!(leaf_network.listening_addrs()[0].port(), leaf_port);

    wait_until("root to accept the leaf", || root_network.session_count() == 1).await;
    assert_eq!(leaf_network.session_count(), 1);

    leaf.shutdown().await;
    root.shutdown().await;
}
