// Copyright (c) Telephone Contributors
// SPDX-License-Identifier: Apache-2.0

//! Message codec for framing and serialization
//!
//! Frames are `[length: u32 BE][bincode payload]`. A frame whose length is
//! acceptable but whose payload does not decode is surfaced as
//! [`InboundFrame::Unrecognized`] so the session can drop it and keep going;
//! an oversize length means the stream is out of sync and is an error.

use crate::constants::{FRAME_HEADER_SIZE, MAX_FRAME_SIZE};
use crate::error::{NetworkError, Result};
use crate::protocols::NetworkMessage;
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// A decoded unit read off a peer link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// Well-formed network message
    Message(NetworkMessage),
    /// Correctly framed payload of an unexpected shape
    Unrecognized { len: usize, reason: String },
}

/// Codec for encoding/decoding network messages
#[derive(Debug, Clone)]
pub struct MessageCodec {
    max_frame_size: usize,
}

impl MessageCodec {
    /// Create a codec accepting payloads up to `max_frame_size` bytes
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new(MAX_FRAME_SIZE)
    }
}

impl Decoder for MessageCodec {
    type Item = InboundFrame;
    type Error = NetworkError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if src.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        let mut length_bytes = [0u8; FRAME_HEADER_SIZE];
        length_bytes.copy_from_slice(&src[..FRAME_HEADER_SIZE]);
        let length = u32::from_be_bytes(length_bytes) as usize;

        if length > self.max_frame_size {
            return Err(NetworkError::InvalidMessage(format!(
                "Frame size {} exceeds maximum {}",
                length, self.max_frame_size
            )));
        }

        if src.len() < FRAME_HEADER_SIZE + length {
            src.reserve(FRAME_HEADER_SIZE + length - src.len());
            return Ok(None);
        }

        src.advance(FRAME_HEADER_SIZE);
        let payload = src.split_to(length);

        match bincode::deserialize::<NetworkMessage>(&payload) {
            Ok(message) => Ok(Some(InboundFrame::Message(message))),
            Err(e) => Ok(Some(InboundFrame::Unrecognized {
                len: length,
                reason: e.to_string(),
            })),
        }
    }
}

impl Encoder<NetworkMessage> for MessageCodec {
    type Error = NetworkError;

    fn encode(&mut self, item: NetworkMessage, dst: &mut BytesMut) -> Result<()> {
        let message_bytes = bincode::serialize(&item)
            .map_err(|e| NetworkError::SerializationError(e.to_string()))?;

        if message_bytes.len() > self.max_frame_size {
            return Err(NetworkError::InvalidMessage(format!(
                "Message size {} exceeds maximum {}",
                message_bytes.len(),
                self.max_frame_size
            )));
        }

        dst.reserve(FRAME_HEADER_SIZE + message_bytes.len());
        dst.put_u32(message_bytes.len() as u32);
        dst.put_slice(&message_bytes);

        Ok(())
    }
}
