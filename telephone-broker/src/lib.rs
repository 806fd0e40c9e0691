//! # Telephone Broker
//!
//! Node-level logic of the telephone mesh, on top of `telephone-network`:
//!
//! - **DedupCache**: time-bounded set of seen message ids
//! - **MessageBroker**: claim, refine, count the hop, display, flood
//! - **Node**: role-based connect state machine (root or leaf)
//! - **Refiner** / **MessageDisplay**: collaborators supplied by the host

pub mod broker;
pub mod dedup_cache;
pub mod display;
pub mod error;
pub mod node;
pub mod refiner;

pub use broker::{BrokerConfig, BrokerStats, MessageBroker, ProcessOutcome};
pub use dedup_cache::{DedupCache, DedupConfig};
pub use display::{MessageDisplay, NoopDisplay};
pub use error::{ConfigError, ConnectError};
pub use node::{ConnectState, Connected, Node};
pub use refiner::{IdentityRefiner, Refiner, UppercaseRefiner};
