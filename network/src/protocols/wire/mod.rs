// Copyright (c) Telephone Contributors
// SPDX-License-Identifier: Apache-2.0

//! Wire protocol for message framing and serialization

pub mod codec;

pub use codec::{InboundFrame, MessageCodec};
