//! Config command handlers

use crate::config::Config;
use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;

pub fn handle(action: crate::ConfigAction, config_path: Option<PathBuf>) -> Result<()> {
    match action {
        crate::ConfigAction::Init { path } => {
            let path = match path.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if Config::init(&path)? {
                println!(
                    "{} Configuration initialized at: {}",
                    "✓".green().bold(),
                    path.display().to_string().cyan()
                );
            } else {
                println!(
                    "{} Configuration already exists at: {}",
                    "•".yellow().bold(),
                    path.display().to_string().cyan()
                );
            }
            Ok(())
        }

        crate::ConfigAction::Show => {
            let config = Config::resolve(config_path.as_deref())?;
            let network = &config.network;

            println!("{}", "Configuration:".bold());
            println!("  Refiner:         {}", format!("{:?}", config.refiner).cyan());
            println!("  Root Port:       {}", network.root_port.to_string().cyan());
            println!(
                "  Discovery Port:  {}",
                network.discovery.discovery_port.to_string().cyan()
            );
            println!(
                "  Network Type:    {}",
                network.discovery.network_type.to_string().cyan()
            );
            println!(
                "  Flood Policy:    {}",
                format!("{:?}", network.peer_manager.flood_policy).cyan()
            );
            println!(
                "  Dedup TTL:       {}",
                format!("{} ms", config.broker.dedup.ttl_ms).cyan()
            );
            println!();
            println!("{}", toml::to_string_pretty(&config)?.dimmed());

            Ok(())
        }
    }
}
