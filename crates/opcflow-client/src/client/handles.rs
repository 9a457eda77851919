// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Handle bookkeeping.
//!
//! Every sub-group owns two maps: client handle to tag (for resolving
//! refresh callbacks) and tag to server handle (for sync read/write and
//! removal). Client handles continue from the current maximum on
//! incremental adds, so a handle is never reassigned to a different tag
//! while its item is live.

use std::collections::{BTreeMap, HashMap};

use crate::error::{DaResult, StateError};
use crate::types::{ClientHandle, ServerHandle};

// =============================================================================
// HandleRegistry
// =============================================================================

/// Bidirectional tag/handle maps, scoped per sub-group.
#[derive(Debug, Default)]
pub struct HandleRegistry {
    /// Sub-group name to (client handle -> tag).
    tags_by_handle: HashMap<String, BTreeMap<ClientHandle, String>>,

    /// Sub-group name to (tag -> server handle).
    server_handles: HashMap<String, HashMap<String, ServerHandle>>,
}

impl HandleRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates one client handle per tag for a sub-group.
    ///
    /// Allocation continues from `max(existing) + 1`, or 0 for an empty
    /// sub-group. The handle-to-tag entries are recorded immediately.
    pub fn allocate(&mut self, sub_group: &str, tags: &[String]) -> Vec<ClientHandle> {
        let map = self.tags_by_handle.entry(sub_group.to_string()).or_default();
        let mut next = map
            .keys()
            .next_back()
            .map(|h| h.value() + 1)
            .unwrap_or(0);

        let mut handles = Vec::with_capacity(tags.len());
        for tag in tags {
            let handle = ClientHandle(next);
            map.insert(handle, tag.clone());
            handles.push(handle);
            next += 1;
        }
        handles
    }

    /// Records the server handle the remote source assigned to a tag.
    pub fn record_server_handle(&mut self, sub_group: &str, tag: &str, handle: ServerHandle) {
        self.server_handles
            .entry(sub_group.to_string())
            .or_default()
            .insert(tag.to_string(), handle);
    }

    /// Resolves a client handle back to its tag.
    pub fn tag_for_handle(&self, sub_group: &str, handle: ClientHandle) -> Option<&str> {
        self.tags_by_handle
            .get(sub_group)?
            .get(&handle)
            .map(String::as_str)
    }

    /// Looks up the server handle recorded for a tag.
    pub fn server_handle(&self, sub_group: &str, tag: &str) -> Option<ServerHandle> {
        self.server_handles.get(sub_group)?.get(tag).copied()
    }

    /// Resolves server handles for a tag list, in order.
    ///
    /// A missing entry means the registry and the live item set have
    /// diverged and is reported as a state error.
    pub fn server_handles_for(
        &self,
        sub_group: &str,
        tags: &[String],
    ) -> DaResult<Vec<ServerHandle>> {
        tags.iter()
            .map(|tag| {
                self.server_handle(sub_group, tag)
                    .ok_or_else(|| StateError::missing_server_handle(sub_group, tag).into())
            })
            .collect()
    }

    /// Drops a tag's entries after its item was removed from the group.
    pub fn release(&mut self, sub_group: &str, tag: &str) {
        if let Some(map) = self.tags_by_handle.get_mut(sub_group) {
            map.retain(|_, t| t.as_str() != tag);
        }
        if let Some(map) = self.server_handles.get_mut(sub_group) {
            map.remove(tag);
        }
    }

    /// Removes every entry recorded for a sub-group.
    pub fn purge(&mut self, sub_group: &str) {
        self.tags_by_handle.remove(sub_group);
        self.server_handles.remove(sub_group);
    }

    /// Removes all entries for all sub-groups.
    pub fn clear(&mut self) {
        self.tags_by_handle.clear();
        self.server_handles.clear();
    }

    /// Number of live client handles in a sub-group.
    pub fn handle_count(&self, sub_group: &str) -> usize {
        self.tags_by_handle
            .get(sub_group)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }
}

// =============================================================================
// Tests
// =============================================================================
