// Copyright (c) Telephone Contributors
// SPDX-License-Identifier: Apache-2.0

//! Network constants

use std::time::Duration;

pub use telephone_types::DEFAULT_ROOT_PORT;

/// Default maximum frame size (1MB)
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Length prefix size of a frame
pub const FRAME_HEADER_SIZE: usize = 4;

/// Default connection timeout
pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time a leaf waits for a discovery response
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(3);

/// Default discovery port (shared with the root's peer listener)
pub const DEFAULT_DISCOVERY_PORT: u16 = DEFAULT_ROOT_PORT;

/// Maximum size of a discovery datagram
pub const MAX_DATAGRAM_SIZE: usize = 1024;

/// Marker carried by every discovery request
pub const DISCOVERY_MAGIC: u32 = 0x5445_4C45; // "TELE"

/// Maximum number of live sessions per node
pub const MAX_SESSIONS: usize = 64;

/// Network protocol version
pub const NETWORK_PROTOCOL_VERSION: u32 = 1;
