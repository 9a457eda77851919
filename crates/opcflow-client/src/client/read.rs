// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Read coordination.
//!
//! A read resolves its group into sub-groups (creating, reusing or
//! reconciling them), then runs one of two protocols per sub-group:
//!
//! - **Synchronous**: a blocking read against the recorded server handles,
//!   returning parallel value/quality/timestamp/error arrays.
//! - **Asynchronous**: a refresh request tagged with a fresh transaction
//!   id, answered out of band on the session's event channel. The wait is
//!   deadline-bounded; refresh events bearing a different transaction id
//!   (late deliveries of an abandoned request) are discarded.
//!
//! Results are assembled per requested tag in request order. A tag missing
//! from the response, or carrying a nonzero per-tag error code, yields a
//! row with no value and quality `Error`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use opcflow_core::{Quality, Value};

use crate::client::groups::{chunk, GroupManager, SubGroupState};
use crate::client::items::trim_remote;
use crate::client::session::{check_tag_names, DaClient};
use crate::client::transport::{DaTransport, ReadSource, RefreshEvent};
use crate::error::{CallbackError, DaError, DaResult, StateError};
use crate::types::{DataSource, ReadOptions, TagReading, TransactionCounter, TransactionId};

impl<T: DaTransport> DaClient<T> {
    /// Reads the given tags, returning one row per tag in request order.
    ///
    /// With a named `group` in the options the sub-groups persist across
    /// calls and later reads reuse them without touching the remote
    /// source's item tables; without one, a transient group is created,
    /// read once and removed. See [`ReadOptions`] for the protocol and
    /// source knobs.
    ///
    /// A fatal failure in one sub-group aborts the whole call; rows from
    /// earlier sub-groups are discarded.
    pub async fn read<S: AsRef<str>>(
        &mut self,
        tags: &[S],
        opts: &ReadOptions,
    ) -> DaResult<Vec<TagReading>> {
        let tags: Vec<String> = tags.iter().map(|t| t.as_ref().to_string()).collect();
        check_tag_names(tags.iter().map(String::as_str))?;

        let sync = opts.effective_sync();
        let update_rate = opts.effective_update_rate();

        let Self {
            transport,
            events,
            groups,
            transactions,
            ..
        } = self;

        // Plan: a known name without rebuild is the fast path and reuses
        // the recorded sub-group count; everything else chunks the tag set.
        let chunks: Option<Vec<Vec<String>>>;
        let num_groups: usize;
        match opts.group.as_deref() {
            Some(name) if groups.contains(name) && !opts.rebuild => {
                num_groups = groups.sub_group_count(name).unwrap_or(0);
                chunks = None;
            }
            _ => {
                let chunked = chunk(&tags, opts.size);
                num_groups = chunked.len();
                chunks = Some(chunked);
            }
        }

        let mut rows: Vec<TagReading> = Vec::with_capacity(tags.len());
        for index in 0..num_groups {
            if index > 0 {
                if let Some(pause) = opts.pause {
                    tokio::time::sleep(pause).await;
                }
            }

            let state = if let Some(chunks) = &chunks {
                match opts.group.as_deref() {
                    None => {
                        groups
                            .build_anonymous(
                                &*transport,
                                &chunks[index],
                                update_rate,
                                !sync,
                                opts.include_error,
                            )
                            .await?
                    }
                    Some(name) => {
                        groups
                            .build_named(
                                &*transport,
                                name,
                                index,
                                &chunks[index],
                                chunks.len(),
                                update_rate,
                                !sync,
                                opts.include_error,
                            )
                            .await?
                    }
                }
            } else {
                groups.reuse(opts.group.as_deref().unwrap_or_default(), index)
            };

            let result =
                read_sub_group(&*transport, events, &*groups, transactions, &state, opts, sync)
                    .await;

            // An anonymous group lives for exactly this read.
            if opts.group.is_none() {
                groups.close_hook(&state.name);
                trace!(sub_group = %state.name, "RemoveGroup");
                if let Err(err) = transport.remove_group(&state.name).await {
                    warn!(
                        sub_group = %state.name,
                        error = %err,
                        "failed to remove anonymous group"
                    );
                    if result.is_ok() {
                        groups.purge_sub_group(&state.name);
                        return Err(err);
                    }
                }
                groups.purge_sub_group(&state.name);
            }

            rows.extend(result?);
        }

        Ok(rows)
    }

    /// Reads a single tag, returning its row directly.
    pub async fn read_one(
        &mut self,
        tag: impl AsRef<str>,
        opts: &ReadOptions,
    ) -> DaResult<TagReading> {
        let rows = self.read(&[tag.as_ref()], opts).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StateError::empty_result("read").into())
    }
}

// =============================================================================
// Per-sub-group protocol
// =============================================================================

async fn read_sub_group<T: DaTransport>(
    transport: &T,
    events: &mut mpsc::Receiver<RefreshEvent>,
    groups: &GroupManager,
    transactions: &mut TransactionCounter,
    state: &SubGroupState,
    opts: &ReadOptions,
    sync: bool,
) -> DaResult<Vec<TagReading>> {
    let source = resolve_source(opts.source, state);

    let mut value_map: HashMap<String, Value> = HashMap::new();
    let mut quality_map: HashMap<String, u16> = HashMap::new();
    let mut time_map: HashMap<String, DateTime<Utc>> = HashMap::new();
    let mut error_map: HashMap<String, i32> = HashMap::new();
    let mut error_msgs = state.error_msgs.clone();

    if !state.valid.is_empty() {
        if sync {
            let handles = groups
                .registry()
                .server_handles_for(&state.name, &state.valid)?;
            trace!(sub_group = %state.name, %source, "SyncRead");
            let response = transport.sync_read(&state.name, source, &handles).await?;
            if !response.is_complete(state.valid.len()) {
                return Err(DaError::remote("SyncRead", "short response from server"));
            }
            for (i, tag) in state.valid.iter().enumerate() {
                value_map.insert(tag.clone(), response.values[i].clone());
                quality_map.insert(tag.clone(), response.qualities[i]);
                time_map.insert(tag.clone(), response.timestamps[i]);
                error_map.insert(tag.clone(), response.error_codes[i]);
            }
        } else {
            let transaction = transactions.next();
            trace!(sub_group = %state.name, %source, %transaction, "AsyncRefresh");
            transport
                .async_refresh(&state.name, source, transaction)
                .await?;
            let event = wait_for_refresh(events, transaction, opts.timeout).await?;

            for (i, handle) in event.client_handles.iter().enumerate() {
                let Some(tag) = groups.registry().tag_for_handle(&state.name, *handle) else {
                    debug!(
                        sub_group = %state.name,
                        handle = %handle,
                        "callback delivered an unknown client handle"
                    );
                    continue;
                };
                let tag = tag.to_string();
                if let Some(value) = event.values.get(i) {
                    value_map.insert(tag.clone(), value.clone());
                }
                if let Some(quality) = event.qualities.get(i) {
                    quality_map.insert(tag.clone(), *quality);
                }
                if let Some(timestamp) = event.timestamps.get(i) {
                    time_map.insert(tag, *timestamp);
                }
            }
        }
    }

    // One row per requested tag, in request order.
    let mut rows = Vec::with_capacity(state.requested.len());
    for tag in &state.requested {
        let delivered = value_map.contains_key(tag);
        let usable = delivered && (!sync || error_map.get(tag).copied().unwrap_or(0) == 0);

        let error = if opts.include_error {
            if delivered {
                let code = error_map.get(tag).copied().unwrap_or(0);
                Some(trim_remote(&transport.error_string(code).await))
            } else {
                Some(error_msgs.remove(tag).unwrap_or_default())
            }
        } else {
            None
        };

        if usable {
            // Time values are returned as strings, like timestamps.
            let value = match value_map.remove(tag).unwrap_or_default() {
                Value::DateTime(ts) => Value::String(ts.to_rfc3339()),
                value => value,
            };
            rows.push(TagReading {
                tag: tag.clone(),
                value: Some(value),
                quality: Quality::from_bits(quality_map.get(tag).copied().unwrap_or(0)),
                timestamp: time_map.get(tag).map(|ts| ts.to_rfc3339()),
                error,
            });
        } else {
            rows.push(TagReading::error_row(tag.clone(), error));
        }
    }

    Ok(rows)
}

/// Resolves the caller's source mode for one sub-group.
///
/// Hybrid reads come from the cache only for a group that already existed
/// and was not touched this call. A reconciliation that submitted new
/// items forces the device even for an explicit cache request, since a
/// fresh item has no cached value yet.
fn resolve_source(requested: DataSource, state: &SubGroupState) -> ReadSource {
    match requested {
        DataSource::Device => ReadSource::Device,
        DataSource::Cache => {
            if state.rebuilt_added {
                ReadSource::Device
            } else {
                ReadSource::Cache
            }
        }
        DataSource::Hybrid => {
            if state.created || state.rebuilt {
                ReadSource::Device
            } else {
                ReadSource::Cache
            }
        }
    }
}

/// Waits for the refresh event carrying `transaction`.
///
/// Events with a different transaction id are stale deliveries of an
/// abandoned request and are discarded. The deadline covers the whole
/// wait, not each receive.
async fn wait_for_refresh(
    events: &mut mpsc::Receiver<RefreshEvent>,
    transaction: TransactionId,
    timeout: std::time::Duration,
) -> DaResult<RefreshEvent> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(DaError::callback_timeout(timeout, transaction));
        }
        match tokio::time::timeout(remaining, events.recv()).await {
            Ok(Some(event)) if event.transaction == transaction => {
                debug!(
                    %transaction,
                    items = event.client_handles.len(),
                    "refresh correlated"
                );
                return Ok(event);
            }
            Ok(Some(stale)) => {
                debug!(
                    stale = %stale.transaction,
                    expected = %transaction,
                    "discarding stale refresh event"
                );
            }
            Ok(None) => return Err(CallbackError::ChannelClosed.into()),
            Err(_) => return Err(DaError::callback_timeout(timeout, transaction)),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
