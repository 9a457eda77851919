// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Session client internals.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         DaClient                                │
//! │        (session facade: read / write / groups / remove)         │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       GroupManager                              │
//! │     (group lifecycle, tag caches, item add/remove, hooks)       │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      HandleRegistry                             │
//! │      (client handle <-> tag, tag -> server handle maps)         │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       DaTransport                               │
//! │          (remote data-source primitives, injected)              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

mod groups;
mod handles;
mod items;
mod read;
mod session;
mod transport;
mod write;

pub use groups::GroupManager;
pub use handles::HandleRegistry;
pub use session::DaClient;
pub use transport::{
    AddItemsResponse, DaTransport, ReadSource, RefreshEvent, SyncReadResponse,
};
