use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Well-known port for the root's peer listener and its discovery responder
pub const DEFAULT_ROOT_PORT: u16 = 8050;

/// Role chosen when joining the mesh; fixed for the process lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRole {
    /// Bootstrap node answering discovery requests
    RootNode,
    /// Node joining through discovery
    LeafNode,
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeRole::RootNode => write!(f, "root"),
            NodeRole::LeafNode => write!(f, "leaf"),
        }
    }
}

impl FromStr for NodeRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "root" => Ok(NodeRole::RootNode),
            "leaf" => Ok(NodeRole::LeafNode),
            other => Err(format!("unknown node role: {}", other)),
        }
    }
}

/// Where discovery traffic is sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    /// Every node runs on this host; discovery goes to loopback
    #[default]
    Local,
    /// Nodes share a LAN segment; discovery goes to the broadcast address
    Public,
}

impl std::fmt::Display for NetworkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkType::Local => write!(f, "local"),
            NetworkType::Public => write!(f, "public"),
        }
    }
}

impl FromStr for NetworkType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(NetworkType::Local),
            "public" => Ok(NetworkType::Public),
            other => Err(format!("unknown network type: {}", other)),
        }
    }
}

/// Discovery result handed to a joining leaf
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerConfiguration {
    /// Port the leaf should listen on for further peers (0 = any free port)
    pub listening_port: u16,
    /// Address of the existing peer to dial
    pub peer_address: String,
    /// Port of the existing peer to dial
    pub peer_port: u16,
}

impl PeerConfiguration {
    pub fn new(listening_port: u16, peer_address: impl Into<String>, peer_port: u16) -> Self {
        Self {
            listening_port,
            peer_address: peer_address.into(),
            peer_port,
        }
    }

    pub fn peer_endpoint(&self) -> String {
        format!("{}:{}", self.peer_address, self.peer_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse() {
        assert_eq!("root".parse::<NodeRole>(), Ok(NodeRole::RootNode));
        assert_eq!("LEAF".parse::<NodeRole>(), Ok(NodeRole::LeafNode));
        assert!("branch".parse::<NodeRole>().is_err());
    }

    #[test]
    fn test_network_type_display_roundtrip() {
        for ty in [NetworkType::Local, NetworkType::Public] {
            assert_eq!(ty.to_string().parse::<NetworkType>(), Ok(ty));
        }
    }

    #[test]
    fn test_peer_endpoint() {
        let cfg = PeerConfiguration::new(9000, "10.0.0.1", DEFAULT_ROOT_PORT);
        assert_eq!(cfg.peer_endpoint(), "10.0.0.1:8050");
    }
}
