// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Remote data-source abstraction.
//!
//! The session never talks to an OPC server directly; it drives the
//! primitives of this trait and correlates the results. Implementations
//! wrap whatever automation or network machinery actually reaches the
//! server. Completed asynchronous refreshes are not returned by
//! [`DaTransport::async_refresh`]; the transport's event-delivery context
//! pushes them as [`RefreshEvent`]s onto the mpsc channel whose receiver
//! the session was constructed with, in server completion order.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use opcflow_core::Value;

use crate::error::DaResult;
use crate::types::{ClientHandle, ServerHandle, TransactionId};

// =============================================================================
// ReadSource
// =============================================================================

/// The data source a read is actually issued against.
///
/// The caller-facing hybrid mode is resolved per sub-group before the wire
/// is touched, so transports only ever see cache or device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadSource {
    /// Read from the server's cache.
    Cache,

    /// Read through to the device.
    Device,
}

impl fmt::Display for ReadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cache => write!(f, "cache"),
            Self::Device => write!(f, "device"),
        }
    }
}

// =============================================================================
// Batch responses
// =============================================================================

/// Response of the add-items primitive, parallel to the submitted names.
#[derive(Debug, Clone)]
pub struct AddItemsResponse {
    /// Server handle per submitted item; meaningful when the matching
    /// error code is zero.
    pub server_handles: Vec<ServerHandle>,

    /// Per-item error code, zero on success.
    pub error_codes: Vec<i32>,
}

impl AddItemsResponse {
    /// Returns `true` if both arrays cover `expected` items.
    pub fn is_complete(&self, expected: usize) -> bool {
        self.server_handles.len() == expected && self.error_codes.len() == expected
    }
}

/// Response of the sync-read primitive, parallel to the submitted handles.
#[derive(Debug, Clone)]
pub struct SyncReadResponse {
    /// Value per item.
    pub values: Vec<Value>,

    /// Per-item error code, zero on success.
    pub error_codes: Vec<i32>,

    /// Quality word per item.
    pub qualities: Vec<u16>,

    /// Source timestamp per item.
    pub timestamps: Vec<DateTime<Utc>>,
}

impl SyncReadResponse {
    /// Returns `true` if all four arrays cover `expected` items.
    pub fn is_complete(&self, expected: usize) -> bool {
        self.values.len() == expected
            && self.error_codes.len() == expected
            && self.qualities.len() == expected
            && self.timestamps.len() == expected
    }
}

/// A completed asynchronous refresh, delivered out of band.
#[derive(Debug, Clone)]
pub struct RefreshEvent {
    /// The transaction this refresh completes.
    pub transaction: TransactionId,

    /// Client handle per delivered item.
    pub client_handles: Vec<ClientHandle>,

    /// Value per delivered item.
    pub values: Vec<Value>,

    /// Quality word per delivered item.
    pub qualities: Vec<u16>,

    /// Source timestamp per delivered item.
    pub timestamps: Vec<DateTime<Utc>>,
}

// =============================================================================
// DaTransport
// =============================================================================

/// Low-level OPC data-access primitives, consumed by the session.
///
/// Group-scoped primitives take the sub-group name the remote source
/// tracks. Call-level failures are reported as errors carrying the
/// remote-supplied text; per-item failures are reported through the error
/// code arrays and never fail the call.
#[async_trait]
pub trait DaTransport: Send + Sync {
    /// Establishes the connection to the server.
    async fn connect(&mut self) -> DaResult<()>;

    /// Closes the connection.
    async fn disconnect(&mut self) -> DaResult<()>;

    /// Returns `true` while connected.
    fn is_connected(&self) -> bool;

    /// Creates a subscription group.
    ///
    /// With `name` of `None` the server assigns a name, which is returned
    /// and identifies the group in every later call.
    async fn add_group(
        &self,
        name: Option<&str>,
        update_rate: Option<Duration>,
    ) -> DaResult<String>;

    /// Looks up a group by name; `None` when the server does not track it.
    async fn get_group(&self, name: &str) -> DaResult<Option<String>>;

    /// Removes a group and everything it tracks.
    async fn remove_group(&self, name: &str) -> DaResult<()>;

    /// Validates tag names against the server's address space.
    ///
    /// Returns one error code per name, zero for valid tags.
    async fn validate_items(&self, group: &str, names: &[String]) -> DaResult<Vec<i32>>;

    /// Adds items to a group under the given client handles.
    async fn add_items(
        &self,
        group: &str,
        names: &[String],
        client_handles: &[ClientHandle],
    ) -> DaResult<AddItemsResponse>;

    /// Removes items from a group by server handle.
    ///
    /// Returns one error code per handle, zero for removed items.
    async fn remove_items(
        &self,
        group: &str,
        server_handles: &[ServerHandle],
    ) -> DaResult<Vec<i32>>;

    /// Reads the given items synchronously.
    async fn sync_read(
        &self,
        group: &str,
        source: ReadSource,
        server_handles: &[ServerHandle],
    ) -> DaResult<SyncReadResponse>;

    /// Writes values to the given items synchronously.
    ///
    /// Returns one error code per handle, zero for written items.
    async fn sync_write(
        &self,
        group: &str,
        server_handles: &[ServerHandle],
        values: &[Value],
    ) -> DaResult<Vec<i32>>;

    /// Requests an asynchronous refresh of every item in the group.
    ///
    /// The completion arrives as a [`RefreshEvent`] bearing `transaction`
    /// on the session's event channel.
    async fn async_refresh(
        &self,
        group: &str,
        source: ReadSource,
        transaction: TransactionId,
    ) -> DaResult<()>;

    /// Formats a remote error code as the server's error text.
    async fn error_string(&self, code: i32) -> String;
}

// =============================================================================
// Tests
// =============================================================================
