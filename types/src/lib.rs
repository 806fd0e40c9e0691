// ========== Core Modules ==========
pub mod message;
pub mod node;

// Export commonly used types
pub use message::{Message, MessageId};
pub use node::{NetworkType, NodeRole, PeerConfiguration, DEFAULT_ROOT_PORT};
