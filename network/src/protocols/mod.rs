// Copyright (c) Telephone Contributors
// SPDX-License-Identifier: Apache-2.0

//! Network protocols and message types

use serde::{Deserialize, Serialize};
use telephone_types::Message;

pub mod wire;

pub use wire::{InboundFrame, MessageCodec};

/// Frames exchanged over a peer link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkMessage {
    /// A chat message being flooded through the mesh
    Broadcast(Message),

    /// Graceful close notice; the sender stops reading after this
    Disconnect {
        reason: String,
    },
}

impl NetworkMessage {
    /// Create a broadcast frame
    pub fn broadcast(message: Message) -> Self {
        NetworkMessage::Broadcast(message)
    }

    /// Create a disconnect frame
    pub fn disconnect(reason: impl Into<String>) -> Self {
        NetworkMessage::Disconnect {
            reason: reason.into(),
        }
    }

    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            NetworkMessage::Broadcast(_) => "broadcast",
            NetworkMessage::Disconnect { .. } => "disconnect",
        }
    }
}
