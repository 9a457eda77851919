// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Core data model for the opcflow OPC data-access client.
//!
//! This crate holds the protocol-agnostic types shared by the session
//! client and by transport implementations:
//!
//! - [`Value`] - the variant payload carried by reads, writes and refresh
//!   callbacks
//! - [`Quality`] - the OPC data-access quality indicator, decoded from the
//!   documented quality bit layout

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod quality;
pub mod types;

pub use quality::Quality;
pub use types::Value;
