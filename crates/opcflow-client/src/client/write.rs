// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Write coordination.
//!
//! Writes never use persistent groups. Each call chunks its pairs, runs
//! every chunk through a transient server-named group (validate, allocate
//! handles, add items, sync write) and removes that group again whether
//! the chunk succeeded or not. A pair is reported `Success` only when
//! every stage succeeded for its tag.

use std::collections::HashMap;

use tracing::{debug, trace, warn};

use opcflow_core::Value;

use crate::client::groups::{chunk, GroupManager};
use crate::client::items::trim_remote;
use crate::client::session::{check_tag_names, DaClient};
use crate::client::transport::DaTransport;
use crate::error::{DaResult, StateError};
use crate::types::{WriteOptions, WriteOutcome, WriteStatus};

impl<T: DaTransport> DaClient<T> {
    /// Writes the given (tag, value) pairs, returning one outcome per pair
    /// in submission order.
    ///
    /// A call-level failure of the sync-write primitive aborts the call;
    /// per-tag validation, add and write failures only mark their own row
    /// as `Error`, annotated with the remote error string when
    /// `include_error` is set.
    pub async fn write(
        &mut self,
        pairs: &[(String, Value)],
        opts: &WriteOptions,
    ) -> DaResult<Vec<WriteOutcome>> {
        check_tag_names(pairs.iter().map(|(tag, _)| tag.as_str()))?;
        if pairs.is_empty() {
            return Ok(Vec::new());
        }

        let Self {
            transport, groups, ..
        } = self;

        let chunks = chunk(pairs, opts.size);
        let mut rows = Vec::with_capacity(pairs.len());

        for (index, batch) in chunks.iter().enumerate() {
            if index > 0 {
                if let Some(pause) = opts.pause {
                    tokio::time::sleep(pause).await;
                }
            }

            trace!("AddGroup");
            let sub_group = transport.add_group(None, None).await?;
            debug!(sub_group = %sub_group, items = batch.len(), "transient write group");

            let result =
                write_chunk(&*transport, groups, &sub_group, batch, opts.include_error).await;

            // The transient group is torn down regardless of the outcome.
            trace!(sub_group = %sub_group, "RemoveGroup");
            if let Err(err) = transport.remove_group(&sub_group).await {
                warn!(
                    sub_group = %sub_group,
                    error = %err,
                    "failed to remove transient write group"
                );
                if result.is_ok() {
                    groups.purge_sub_group(&sub_group);
                    return Err(err);
                }
            }
            groups.purge_sub_group(&sub_group);

            rows.extend(result?);
        }

        Ok(rows)
    }

    /// Writes a single (tag, value) pair, returning its outcome directly.
    pub async fn write_one(
        &mut self,
        tag: impl Into<String>,
        value: impl Into<Value>,
        opts: &WriteOptions,
    ) -> DaResult<WriteOutcome> {
        let pair = (tag.into(), value.into());
        let rows = self.write(std::slice::from_ref(&pair), opts).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StateError::empty_result("write").into())
    }
}

// =============================================================================
// Per-chunk protocol
// =============================================================================

async fn write_chunk<T: DaTransport>(
    transport: &T,
    groups: &mut GroupManager,
    sub_group: &str,
    pairs: &[(String, Value)],
    include_error: bool,
) -> DaResult<Vec<WriteOutcome>> {
    let tags: Vec<String> = pairs.iter().map(|(tag, _)| tag.clone()).collect();
    let outcome = groups
        .add_items(transport, sub_group, &tags, include_error)
        .await?;
    let mut errors = outcome.errors;

    // First occurrence wins for duplicated tags within one chunk.
    let mut value_by_tag: HashMap<&str, &Value> = HashMap::new();
    for (tag, value) in pairs {
        value_by_tag.entry(tag.as_str()).or_insert(value);
    }
    let values: Vec<Value> = outcome
        .valid_tags
        .iter()
        .map(|tag| {
            value_by_tag
                .get(tag.as_str())
                .copied()
                .cloned()
                .unwrap_or_default()
        })
        .collect();

    let mut codes: HashMap<&str, i32> = HashMap::new();
    if !outcome.valid_tags.is_empty() {
        trace!(sub_group, count = outcome.valid_tags.len(), "SyncWrite");
        let response = transport
            .sync_write(sub_group, &outcome.server_handles, &values)
            .await?;
        for (tag, code) in outcome.valid_tags.iter().zip(&response) {
            codes.insert(tag.as_str(), *code);
            if include_error {
                let text = transport.error_string(*code).await;
                errors.insert(tag.clone(), trim_remote(&text));
            }
        }
    }

    let mut rows = Vec::with_capacity(pairs.len());
    for (tag, _) in pairs {
        let status = match codes.get(tag.as_str()) {
            Some(0) => WriteStatus::Success,
            _ => WriteStatus::Error,
        };
        let error = if include_error {
            Some(errors.get(tag).cloned().unwrap_or_default())
        } else {
            None
        };
        rows.push(WriteOutcome {
            tag: tag.clone(),
            status,
            error,
        });
    }

    Ok(rows)
}
