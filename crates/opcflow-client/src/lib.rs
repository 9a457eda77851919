// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Session manager for OPC data-access servers.
//!
//! This crate implements the client side of tag-based data acquisition:
//! subscription group lifecycle, tag validation and handle bookkeeping,
//! and the dual-protocol read path (synchronous blocking reads and
//! asynchronous refreshes correlated to out-of-band callbacks by
//! transaction id, under a timeout).
//!
//! The wire itself is out of scope: the session drives the primitives of
//! the [`DaTransport`] trait and an implementation supplies the actual
//! automation or network machinery.
//!
//! # Example
//!
//! ```rust,ignore
//! use opcflow_client::{DaClient, ReadOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (transport, events) = MyTransport::with_events(64);
//!     let mut client = DaClient::new(transport, events);
//!     client.connect().await?;
//!
//!     // One-shot read through an anonymous group.
//!     let opts = client.read_options();
//!     let reading = client.read_one("Plant.Furnace.Temp", &opts).await?;
//!     println!("{} = {:?} ({})", reading.tag, reading.value, reading.quality);
//!
//!     // Batched read through a persistent group, two tags per sub-group.
//!     let opts = client.read_options().group("furnace").size(2);
//!     let rows = client.read(&["T1", "T2", "T3"], &opts).await?;
//!
//!     client.remove(["furnace"]).await?;
//!     client.close().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod client;
pub mod error;
pub mod types;

// Re-export the core data model.
pub use opcflow_core::{Quality, Value};

pub use client::{
    AddItemsResponse, DaClient, DaTransport, GroupManager, HandleRegistry, ReadSource,
    RefreshEvent, SyncReadResponse,
};
pub use error::{
    CallbackError, ConfigurationError, DaError, DaResult, RemoteError, RequestError, StateError,
};
pub use types::{
    ClientHandle, DataSource, ReadOptions, ServerHandle, SessionConfig, SessionConfigBuilder,
    TagReading, TransactionCounter, TransactionId, WriteOptions, WriteOutcome, WriteStatus,
};
