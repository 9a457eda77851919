// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The session facade.
//!
//! [`DaClient`] is one logical session against one remote data source. It
//! owns the transport, the refresh-event receiver, the group manager (and
//! through it the handle registry) and the transaction counter.
//!
//! # Thread Safety
//!
//! A session is single-threaded by contract: every method takes
//! `&mut self` and callers must serialize access. At most one asynchronous
//! refresh is outstanding at a time. Wrap the client in your own
//! synchronization if it must be shared.

use tokio::sync::mpsc;
use tracing::{info, trace, warn};

use crate::client::groups::GroupManager;
use crate::client::transport::{DaTransport, RefreshEvent};
use crate::error::{DaResult, RequestError};
use crate::types::{ReadOptions, SessionConfig, TransactionCounter, WriteOptions};

// =============================================================================
// DaClient
// =============================================================================

/// A client session for an OPC data-access server.
///
/// The transport is an injected collaborator: the session drives its
/// primitives and keeps the group, tag and handle bookkeeping consistent
/// across calls. Completed asynchronous refreshes are consumed from the
/// `events` receiver handed in at construction; its sender side belongs to
/// the transport's event-delivery context.
pub struct DaClient<T: DaTransport> {
    /// The remote data source.
    pub(crate) transport: T,

    /// Refresh callbacks, in server completion order.
    pub(crate) events: mpsc::Receiver<RefreshEvent>,

    /// Group, tag and handle bookkeeping.
    pub(crate) groups: GroupManager,

    /// Transaction id allocator for asynchronous refreshes.
    pub(crate) transactions: TransactionCounter,

    /// Session defaults.
    pub(crate) config: SessionConfig,
}

impl<T: DaTransport> DaClient<T> {
    /// Creates a session with default configuration.
    pub fn new(transport: T, events: mpsc::Receiver<RefreshEvent>) -> Self {
        Self::with_config(transport, events, SessionConfig::default())
    }

    /// Creates a session with the given configuration.
    pub fn with_config(
        transport: T,
        events: mpsc::Receiver<RefreshEvent>,
        config: SessionConfig,
    ) -> Self {
        Self {
            transport,
            events,
            groups: GroupManager::new(),
            transactions: TransactionCounter::new(),
            config,
        }
    }

    /// Returns the session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns the group, tag and handle bookkeeping.
    pub fn group_manager(&self) -> &GroupManager {
        &self.groups
    }

    /// Returns `true` while the transport is connected.
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Connects (or reconnects) to the remote source.
    ///
    /// Any group, tag or handle state cached from a previous connection is
    /// invalid on the new one and is dropped.
    pub async fn connect(&mut self) -> DaResult<()> {
        trace!("Connect");
        self.transport.connect().await?;
        self.groups.clear();
        info!("session connected");
        Ok(())
    }

    /// Disconnects from the remote source.
    ///
    /// Live groups are removed first, best effort: a removal failure is
    /// logged but does not prevent the disconnect.
    pub async fn close(&mut self) -> DaResult<()> {
        let names = self.groups.group_names();
        if !names.is_empty() {
            if let Err(err) = self.groups.remove_groups(&self.transport, &names).await {
                warn!(error = %err, "failed to remove groups during close");
            }
        }
        trace!("Disconnect");
        self.transport.disconnect().await?;
        self.groups.clear();
        info!("session closed");
        Ok(())
    }

    /// Returns the names of the live persistent groups.
    pub fn groups(&self) -> Vec<String> {
        self.groups.group_names()
    }

    /// Removes the named groups and purges all their bookkeeping.
    ///
    /// Names this session does not track are ignored.
    pub async fn remove<I, S>(&mut self, names: I) -> DaResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<String> = names
            .into_iter()
            .map(|name| name.as_ref().to_string())
            .collect();
        self.groups.remove_groups(&self.transport, &names).await
    }

    /// Returns read options seeded from the session defaults.
    pub fn read_options(&self) -> ReadOptions {
        ReadOptions::from_config(&self.config)
    }

    /// Returns write options seeded from the session defaults.
    pub fn write_options(&self) -> WriteOptions {
        WriteOptions::from_config(&self.config)
    }
}

impl<T: DaTransport> std::fmt::Debug for DaClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaClient")
            .field("connected", &self.transport.is_connected())
            .field("groups", &self.groups.group_names())
            .finish()
    }
}

// =============================================================================
// Request validation
// =============================================================================

/// Rejects malformed tag names before any remote call.
///
/// Health pseudo-tags (prefixed `@`) belong to the health monitor, not to
/// this session, and must not be mixed with process tags.
pub(crate) fn check_tag_names<'a>(tags: impl Iterator<Item = &'a str>) -> DaResult<()> {
    let mut health: Option<String> = None;
    let mut process = 0usize;

    for tag in tags {
        if tag.is_empty() {
            return Err(RequestError::EmptyTagName.into());
        }
        if tag.starts_with('@') {
            health.get_or_insert_with(|| tag.to_string());
        } else {
            process += 1;
        }
    }

    match health {
        Some(_) if process > 0 => Err(RequestError::MixedTagSpaces.into()),
        Some(tag) => Err(RequestError::health_tag(tag).into()),
        None => Ok(()),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DaError;

    #[test]
    fn test_check_tag_names_accepts_process_tags() {
        assert!(check_tag_names(["T1", "T2"].into_iter()).is_ok());
        assert!(check_tag_names(std::iter::empty()).is_ok());
    }

    #[test]
    fn test_check_tag_names_rejects_empty() {
        let err = check_tag_names(["T1", ""].into_iter()).unwrap_err();
        assert!(matches!(err, DaError::Request(RequestError::EmptyTagName)));
    }

    #[test]
    fn test_check_tag_names_rejects_health_tags() {
        let err = check_tag_names(["@MEM_FREE"].into_iter()).unwrap_err();
        assert!(matches!(err, DaError::Request(RequestError::HealthTag { .. })));
    }

    #[test]
    fn test_check_tag_names_rejects_mixed_spaces() {
        let err = check_tag_names(["T1", "@CPU"].into_iter()).unwrap_err();
        assert!(matches!(err, DaError::Request(RequestError::MixedTagSpaces)));
    }
}
