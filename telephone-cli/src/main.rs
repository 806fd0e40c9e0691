//! Telephone CLI - run a node of the telephone mesh
//!
//! Usage:
//!   telephone root
//!   telephone leaf --root-address 192.168.1.10
//!   telephone --network-type public leaf
//!   telephone config init

mod commands;
mod config;
mod display;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use telephone_types::{NetworkType, NodeRole};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "telephone")]
#[command(about = "Telephone - pass a message around a mesh, one refinement per hop", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Local (loopback) or public (LAN broadcast) discovery
    #[arg(long, global = true)]
    network_type: Option<NetworkType>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the root node and answer discovery
    Root,

    /// Discover the root and join as a leaf
    Leaf {
        /// Send discovery to this host instead of broadcasting
        #[arg(long)]
        root_address: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Initialize configuration
    Init {
        /// Config file path
        #[arg(long)]
        path: Option<PathBuf>,
    },

    /// Show current configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let (role, root_address) = match cli.command {
        Commands::Config { action } => return commands::config::handle(action, cli.config),
        Commands::Root => (NodeRole::RootNode, None),
        Commands::Leaf { root_address } => (NodeRole::LeafNode, root_address),
    };

    let mut config = config::Config::resolve(cli.config.as_deref())?;
    if let Some(network_type) = cli.network_type {
        config.network.discovery.network_type = network_type;
    }

    commands::node::run(role, root_address, config).await
}
