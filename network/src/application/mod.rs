// Copyright (c) Telephone Contributors
// SPDX-License-Identifier: Apache-2.0

//! Application-level network interface

pub mod interface;

pub use interface::NetworkInterface;
