// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Subscription group lifecycle.
//!
//! A caller-visible group maps to one or more sub-groups on the remote
//! source, named `"<group>.<index>"`. The number of sub-groups is fixed by
//! the chunking performed at creation and drives teardown. Anonymous
//! groups use the server-assigned name and live for a single read.
//!
//! [`GroupManager`] owns the per-sub-group tag caches, the event-hook set
//! and the [`HandleRegistry`]; the item-level add/remove operations live in
//! the `items` module.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tracing::{info, trace, warn};

use crate::client::handles::HandleRegistry;
use crate::client::transport::DaTransport;
use crate::error::DaResult;

// =============================================================================
// Chunking
// =============================================================================

/// Splits items into fixed-size chunks, preserving order.
///
/// With no size (or zero) everything lands in a single chunk. An empty
/// input with an explicit size yields no chunks at all.
pub(crate) fn chunk<T: Clone>(items: &[T], size: Option<usize>) -> Vec<Vec<T>> {
    match size {
        Some(s) if s > 0 => items.chunks(s).map(<[T]>::to_vec).collect(),
        _ => vec![items.to_vec()],
    }
}

// =============================================================================
// SubGroupState
// =============================================================================

/// The resolved state of one sub-group for the duration of a read.
#[derive(Debug, Clone)]
pub(crate) struct SubGroupState {
    /// The sub-group name the remote source tracks.
    pub name: String,

    /// Tags requested for this sub-group, in request order.
    pub requested: Vec<String>,

    /// Tags that are live items, a subset of `requested`.
    pub valid: Vec<String>,

    /// Per-tag error strings collected during validation and add.
    pub error_msgs: HashMap<String, String>,

    /// The sub-group was created by this call.
    pub created: bool,

    /// The sub-group's item set was reconciled by this call.
    pub rebuilt: bool,

    /// The reconciliation submitted new items.
    pub rebuilt_added: bool,
}

// =============================================================================
// GroupManager
// =============================================================================

/// Creates, reuses, rebuilds and tears down subscription groups.
///
/// State machine per group: absent, created, resolved or rebuilt on later
/// calls, removed. All state is private to the owning session; reconnect
/// clears it wholesale.
#[derive(Debug, Default)]
pub struct GroupManager {
    /// Handle maps for every live sub-group.
    registry: HandleRegistry,

    /// Group name to recorded sub-group count.
    counts: HashMap<String, usize>,

    /// Sub-group name to the tags requested for it.
    requested: HashMap<String, Vec<String>>,

    /// Sub-group name to its live (validated and added) tags.
    valid: HashMap<String, Vec<String>>,

    /// Sub-groups with a live event hook.
    hooks: HashSet<String>,
}

impl GroupManager {
    /// Creates an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the live group names.
    pub fn group_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.counts.keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns `true` if the group is tracked.
    pub fn contains(&self, name: &str) -> bool {
        self.counts.contains_key(name)
    }

    /// Returns the recorded sub-group count for a group.
    pub fn sub_group_count(&self, name: &str) -> Option<usize> {
        self.counts.get(name).copied()
    }

    /// Read access to the handle registry.
    pub fn registry(&self) -> &HandleRegistry {
        &self.registry
    }

    /// Mutable access to the handle registry.
    pub(crate) fn registry_mut(&mut self) -> &mut HandleRegistry {
        &mut self.registry
    }

    /// Drops every group, cache and handle entry.
    ///
    /// Called when the connection is (re)established: server-side groups
    /// from a previous connection no longer exist.
    pub fn clear(&mut self) {
        self.counts.clear();
        self.requested.clear();
        self.valid.clear();
        self.hooks.clear();
        self.registry.clear();
    }

    /// Marks a sub-group as having a live event hook.
    pub(crate) fn open_hook(&mut self, sub_group: &str) {
        trace!(sub_group, "WithEvents");
        self.hooks.insert(sub_group.to_string());
    }

    /// Closes a sub-group's event hook, if one is live.
    pub(crate) fn close_hook(&mut self, sub_group: &str) {
        if self.hooks.remove(sub_group) {
            trace!(sub_group, "CloseEvents");
        }
    }

    /// Drops every cache and handle entry for one sub-group.
    pub(crate) fn purge_sub_group(&mut self, sub_group: &str) {
        self.requested.remove(sub_group);
        self.valid.remove(sub_group);
        self.hooks.remove(sub_group);
        self.registry.purge(sub_group);
    }

    /// Resolves a cached sub-group without touching the remote source.
    pub(crate) fn reuse(&self, group: &str, index: usize) -> SubGroupState {
        let name = sub_group_name(group, index);
        SubGroupState {
            requested: self.requested.get(&name).cloned().unwrap_or_default(),
            valid: self.valid.get(&name).cloned().unwrap_or_default(),
            error_msgs: HashMap::new(),
            name,
            created: false,
            rebuilt: false,
            rebuilt_added: false,
        }
    }

    /// Creates an anonymous single-use sub-group and populates it.
    pub(crate) async fn build_anonymous<T: DaTransport>(
        &mut self,
        transport: &T,
        tags: &[String],
        update_rate: Option<Duration>,
        hook: bool,
        include_error: bool,
    ) -> DaResult<SubGroupState> {
        trace!("AddGroup");
        let name = transport.add_group(None, update_rate).await?;
        if hook {
            self.open_hook(&name);
        }
        let outcome = self.add_items(transport, &name, tags, include_error).await?;
        self.requested.insert(name.clone(), tags.to_vec());
        self.valid.insert(name.clone(), outcome.valid_tags.clone());
        Ok(SubGroupState {
            name,
            requested: tags.to_vec(),
            valid: outcome.valid_tags,
            error_msgs: outcome.errors,
            created: true,
            rebuilt: false,
            rebuilt_added: false,
        })
    }

    /// Creates or reconciles the sub-group at `index` of a named group.
    ///
    /// A sub-group the server already tracks is reconciled against the
    /// requested tags; anything else is created fresh. The recorded
    /// sub-group count only ever grows, so teardown always covers every
    /// sub-group that ever existed.
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn build_named<T: DaTransport>(
        &mut self,
        transport: &T,
        group: &str,
        index: usize,
        tags: &[String],
        total_chunks: usize,
        update_rate: Option<Duration>,
        hook: bool,
        include_error: bool,
    ) -> DaResult<SubGroupState> {
        let name = sub_group_name(group, index);

        trace!(sub_group = %name, "GetOPCGroup");
        if transport.get_group(&name).await?.is_some() {
            if !self.requested.contains_key(&name) {
                warn!(
                    sub_group = %name,
                    "reconciling a server-side group this session has no record of"
                );
            }
            let state = self.rebuild_sub_group(transport, &name, tags, include_error).await?;
            self.record_count(group, total_chunks);
            return Ok(state);
        }

        trace!(sub_group = %name, "AddGroup");
        transport.add_group(Some(&name), update_rate).await?;
        self.record_count(group, total_chunks);
        if hook {
            self.open_hook(&name);
        }
        let outcome = self.add_items(transport, &name, tags, include_error).await?;
        self.requested.insert(name.clone(), tags.to_vec());
        self.valid.insert(name.clone(), outcome.valid_tags.clone());
        info!(
            group = group,
            sub_group = %name,
            items = outcome.valid_tags.len(),
            "sub-group created"
        );
        Ok(SubGroupState {
            name,
            requested: tags.to_vec(),
            valid: outcome.valid_tags,
            error_msgs: outcome.errors,
            created: true,
            rebuilt: false,
            rebuilt_added: false,
        })
    }

    /// Reconciles a live sub-group's item set with the requested tags.
    ///
    /// New tags are added, tags no longer requested are removed, and the
    /// caches are updated. Reconciling twice with the same tag set issues
    /// no remote item calls the second time.
    async fn rebuild_sub_group<T: DaTransport>(
        &mut self,
        transport: &T,
        name: &str,
        tags: &[String],
        include_error: bool,
    ) -> DaResult<SubGroupState> {
        let valid_before = self.valid.get(name).cloned().unwrap_or_default();
        let add_tags: Vec<String> = tags
            .iter()
            .filter(|t| !valid_before.contains(t))
            .cloned()
            .collect();
        let del_tags: Vec<String> = valid_before
            .iter()
            .filter(|t| !tags.contains(t))
            .cloned()
            .collect();

        let mut valid = valid_before;
        let mut error_msgs = HashMap::new();
        let added = !add_tags.is_empty();

        if added {
            let outcome = self
                .add_items(transport, name, &add_tags, include_error)
                .await?;
            valid.extend(outcome.valid_tags);
            error_msgs.extend(outcome.errors);
        }
        if !del_tags.is_empty() {
            self.remove_items(transport, name, &del_tags).await?;
            valid.retain(|t| !del_tags.contains(t));
        }

        info!(
            sub_group = name,
            added = add_tags.len(),
            removed = del_tags.len(),
            "sub-group rebuilt"
        );
        self.requested.insert(name.to_string(), tags.to_vec());
        self.valid.insert(name.to_string(), valid.clone());
        Ok(SubGroupState {
            name: name.to_string(),
            requested: tags.to_vec(),
            valid,
            error_msgs,
            created: false,
            rebuilt: true,
            rebuilt_added: added,
        })
    }

    /// Removes the named groups from the remote source and purges every
    /// associated cache and handle entry.
    ///
    /// Names the session does not track are skipped. A remote removal
    /// failure is fatal and propagated.
    pub(crate) async fn remove_groups<T: DaTransport>(
        &mut self,
        transport: &T,
        names: &[String],
    ) -> DaResult<()> {
        for name in names {
            let Some(count) = self.counts.get(name).copied() else {
                continue;
            };
            for index in 0..count {
                let sub = sub_group_name(name, index);
                self.close_hook(&sub);
                trace!(sub_group = %sub, "RemoveGroup");
                transport.remove_group(&sub).await?;
                self.purge_sub_group(&sub);
            }
            self.counts.remove(name);
            info!(group = %name, sub_groups = count, "group removed");
        }
        Ok(())
    }

    fn record_count(&mut self, group: &str, total_chunks: usize) {
        self.counts
            .entry(group.to_string())
            .and_modify(|c| *c = (*c).max(total_chunks))
            .or_insert(total_chunks);
    }
}

/// Formats the sub-group name the remote source tracks.
fn sub_group_name(group: &str, index: usize) -> String {
    format!("{}.{}", group, index)
}

// =============================================================================
// Tests
// =============================================================================
