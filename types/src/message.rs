use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Globally unique message identifier, assigned once at the originating node.
pub type MessageId = Uuid;

/// A chat message travelling through the mesh.
///
/// The identifier never changes after creation. The body is rewritten by the
/// refiner and the hop count grows by one at every node that relays it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    id: MessageId,
    body: String,
    hop_count: u32,
}

impl Message {
    /// Create a freshly originated message (hop count 0)
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            body: body.into(),
            hop_count: 0,
        }
    }

    /// Rebuild a message with a known identity
    pub fn with_id(id: MessageId, body: impl Into<String>, hop_count: u32) -> Self {
        Self {
            id,
            body: body.into(),
            hop_count,
        }
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn hop_count(&self) -> u32 {
        self.hop_count
    }

    /// Replace the body, returning the previous one
    pub fn set_body(&mut self, body: impl Into<String>) -> String {
        std::mem::replace(&mut self.body, body.into())
    }

    /// Record one more relay. Returns the new hop count.
    pub fn increment_hops(&mut self) -> u32 {
        self.hop_count = self.hop_count.saturating_add(1);
        self.hop_count
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{} hops={}] {}", self.id, self.hop_count, self.body)
    }
}
