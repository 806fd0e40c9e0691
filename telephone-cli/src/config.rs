//! Configuration management

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use telephone_broker::{BrokerConfig, IdentityRefiner, Refiner, UppercaseRefiner};
use telephone_network::NetworkConfig;

pub const ENV_ROOT_PORT: &str = "TELEPHONE_ROOT_PORT";
pub const ENV_DISCOVERY_PORT: &str = "TELEPHONE_DISCOVERY_PORT";

/// Transformation applied at each hop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefinerKind {
    #[default]
    Uppercase,
    Identity,
}

impl RefinerKind {
    pub fn build(self) -> std::sync::Arc<dyn Refiner> {
        match self {
            RefinerKind::Uppercase => std::sync::Arc::new(UppercaseRefiner),
            RefinerKind::Identity => std::sync::Arc::new(IdentityRefiner),
        }
    }
}

/// CLI configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub refiner: RefinerKind,
    pub network: NetworkConfig,
    pub broker: BrokerConfig,
}

impl Config {
    /// Load config from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get default config path
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| anyhow!("failed to locate home directory"))?;
        Ok(home.join(".telephone").join("config.toml"))
    }

    /// Write a default config to `path` unless one exists
    pub fn init(path: &Path) -> Result<bool> {
        if path.exists() {
            return Ok(false);
        }
        Config::default().save(path)?;
        Ok(true)
    }

    /// Load `path`, or the default file if present, or built-in defaults;
    /// then apply environment overrides and validate.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Config::load(path)?,
            None => match Config::default_path() {
                Ok(default) if default.exists() => Config::load(&default)?,
                _ => Config::default(),
            },
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.broker
            .validate()
            .context("invalid [broker.dedup] settings")?;
        Ok(())
    }

    /// Apply port overrides looked up through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = parse_port(&lookup, ENV_ROOT_PORT)? {
            self.network.root_port = port;
        }
        if let Some(port) = parse_port(&lookup, ENV_DISCOVERY_PORT)? {
            self.network.discovery.discovery_port = port;
        }
        Ok(())
    }
}

fn parse_port<F>(lookup: &F, key: &str) -> Result<Option<u16>>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| {
            value
                .trim()
                .parse::<u16>()
                .with_context(|| format!("{} must be a port number, got {:?}", key, value))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use telephone_network::{FloodPolicy, PeerSelection};

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_overrides(|key| match key {
                ENV_ROOT_PORT => Some("9100".to_string()),
                ENV_DISCOVERY_PORT => Some(" 9101 ".to_string()),
                _ => None,
            })
            .unwrap();

        assert_eq!(config.network.root_port, 9100);
        assert_eq!(config.network.discovery.discovery_port, 9101);
    }

    #[test]
    fn test_bad_override_rejected() {
        let mut config = Config::default();
        let result = config.apply_overrides(|key| {
            (key == ENV_ROOT_PORT).then(|| "not-a-port".to_string())
        });
        assert!(result.is_err());
        assert_eq!(config.network.root_port, 8050);
    }

    #[test]
    fn test_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            refiner = "identity"

            [network]
            root_port = 7000

            [network.peer_manager]
            flood_policy = "all_neighbours"

            [network.discovery]
            peer_selection = "chain"
            "#,
        )
        .unwrap();

        assert_eq!(config.refiner, RefinerKind::Identity);
        assert_eq!(config.network.root_port, 7000);
        assert_eq!(config.network.discovery.discovery_port, 8050);
        assert_eq!(config.network.peer_manager.flood_policy, FloodPolicy::AllNeighbours);
        assert_eq!(config.network.discovery.peer_selection, PeerSelection::Chain);
        assert_eq!(config.broker.dedup.ttl_ms, 5000);
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("telephone-config-{}", std::process::id()));
        let path = dir.join("config.toml");

        assert!(Config::init(&path).unwrap());
        assert!(!Config::init(&path).unwrap());

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.network.root_port, 8050);
        assert_eq!(loaded.refiner, RefinerKind::Uppercase);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_zero_dedup_settings_rejected() {
        let config: Config = toml::from_str(
            r#"
            [broker.dedup]
            ttl_ms = 0
            "#,
        )
        .unwrap();
        assert!(config.validate().is_err());

        let config: Config = toml::from_str(
            r#"
            [broker.dedup]
            sweep_interval_ms = 0
            "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_resolve_rejects_zero_ttl_file() {
        let dir = std::env::temp_dir().join(format!("telephone-bad-config-{}", std::process::id()));
        let path = dir.join("config.toml");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(&path, "[broker.dedup]\nttl_ms = 0\n").unwrap();

        let err = Config::resolve(Some(&path)).unwrap_err();
        assert!(format!("{:#}", err).contains("ttl_ms"));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
