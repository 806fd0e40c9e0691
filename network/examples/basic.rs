// Copyright (c) Telephone Contributors
// SPDX-License-Identifier: Apache-2.0

//! Example: two peers on loopback exchanging one message

use telephone_network::{NetworkConfig, NetworkInterface, PeerManager};
use telephone_types::Message;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut config = NetworkConfig::default();
    config.transport.bind_address = "127.0.0.1".to_string();

    let listener: PeerManager = config.peer_manager();
    let dialer: PeerManager = config.peer_manager();

    let addr = listener.start_listening(0).await?;
    dialer.connect("127.0.0.1", addr.port()).await?;

    let message = Message::new("hello, neighbour");
    let sent = NetworkInterface::post_outbound(&dialer, message);
    println!("Queued on {} session(s)", sent);

    let cancel = CancellationToken::new();
    let inbound = listener.next_inbound(&cancel).await?;
    println!(
        "Session {} delivered: {}",
        inbound.session_id, inbound.message
    );

    dialer.shutdown().await;
    listener.shutdown().await;
    Ok(())
}
