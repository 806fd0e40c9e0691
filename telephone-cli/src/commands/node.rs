//! Run a node and compose messages from stdin

use crate::config::Config;
use crate::display::ConsoleDisplay;
use anyhow::{Context, Result};
use colored::Colorize;
use std::sync::Arc;
use telephone_broker::{Connected, MessageBroker, Node};
use telephone_network::PeerManager;
use telephone_types::NodeRole;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub async fn run(role: NodeRole, root_address: Option<String>, config: Config) -> Result<()> {
    let network = Arc::new(config.network.peer_manager());
    let display = Arc::new(ConsoleDisplay);
    let node = Node::new(network.clone(), config.network.clone(), display.clone());

    let connected = node
        .connect(role, root_address)
        .await
        .context("failed to join the mesh")?;
    print_connected(&connected);

    let broker = Arc::new(
        MessageBroker::new(
            network.clone(),
            config.refiner.build(),
            display,
            config.broker.clone(),
        )
        .context("invalid broker configuration")?,
    );

    let cancel = CancellationToken::new();
    let broker_task = {
        let broker = broker.clone();
        let cancel = cancel.child_token();
        tokio::spawn(async move { broker.run(cancel).await })
    };

    compose(&broker, &network, &cancel).await?;

    info!("Shutting down");
    cancel.cancel();
    match broker_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Broker stopped with error"),
        Err(e) => warn!(error = %e, "Broker task failed"),
    }
    node.shutdown().await;

    let stats = broker.stats();
    let metrics = network.metrics().snapshot();
    info!(
        processed = stats.processed,
        duplicates = stats.duplicates,
        originated = stats.originated,
        messages_sent = metrics.messages_sent,
        messages_received = metrics.messages_received,
        "Node stopped"
    );
    Ok(())
}

/// Read lines from stdin until EOF, `/quit` or Ctrl-C
async fn compose(
    broker: &MessageBroker,
    network: &PeerManager,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!(
        "{}",
        "Type a message and press enter. /peers, /stats, /quit".dimmed()
    );

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for Ctrl-C")?;
                break;
            }
            line = lines.next_line() => line.context("failed to read stdin")?,
        };

        let Some(line) = line else {
            break;
        };
        let text = line.trim();

        match text {
            "" => continue,
            "/quit" => break,
            "/peers" => {
                for session in network.sessions() {
                    println!(
                        "  #{} {} ({}, {}s)",
                        session.id,
                        session.remote_addr,
                        session.direction,
                        session.connection_duration().as_secs()
                    );
                }
                println!("  {} peer(s)", network.session_count());
            }
            "/stats" => {
                let stats = broker.stats();
                let metrics = network.metrics().snapshot();
                println!(
                    "  processed {}  duplicates {}  originated {}  sent {}  received {}",
                    stats.processed,
                    stats.duplicates,
                    stats.originated,
                    metrics.messages_sent,
                    metrics.messages_received
                );
            }
            text => {
                let id = broker.send_text(text);
                println!("{} {}", "sent".dimmed(), id.to_string().dimmed());
            }
        }
    }

    Ok(())
}

fn print_connected(connected: &Connected) {
    match connected {
        Connected::Root {
            listen_addr,
            discovery_addr,
        } => {
            println!(
                "{} Root listening on {} (discovery on {})",
                "✓".green().bold(),
                listen_addr.to_string().cyan(),
                discovery_addr.to_string().cyan()
            );
        }
        Connected::Leaf {
            listen_addr,
            config,
            ..
        } => {
            println!(
                "{} Leaf listening on {}, linked to {}",
                "✓".green().bold(),
                listen_addr.to_string().cyan(),
                config.peer_endpoint().cyan()
            );
        }
    }
}
