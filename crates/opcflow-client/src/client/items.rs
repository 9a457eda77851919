// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Item subscription maintenance.
//!
//! Adding items is a two-step conversation with the remote source:
//! validation filters the tag list down to names the server knows, then
//! the add call turns the survivors into live items with server handles.
//! Both steps report per-tag error codes; a failure of either call as a
//! whole degrades to "treat all as invalid" rather than aborting, since
//! the caller can still assemble a result with error rows. Removal is the
//! opposite: any failure there is fatal, because a half-removed item set
//! leaves the handle bookkeeping inconsistent with the live group.

use std::collections::HashMap;

use tracing::{trace, warn};

use crate::client::groups::GroupManager;
use crate::client::transport::DaTransport;
use crate::error::{DaResult, RemoteError};
use crate::types::ServerHandle;

/// Strips the trailing line noise OPC servers put in their error strings.
pub(crate) fn trim_remote(text: &str) -> String {
    text.trim_matches(|c| c == '\r' || c == '\n').to_string()
}

// =============================================================================
// ItemAddOutcome
// =============================================================================

/// Result of an add-items pass over a sub-group.
#[derive(Debug, Default)]
pub(crate) struct ItemAddOutcome {
    /// Tags that are now live items, a subset of the requested tags.
    pub valid_tags: Vec<String>,

    /// Server handles parallel to `valid_tags`.
    pub server_handles: Vec<ServerHandle>,

    /// Per-tag error strings for tags that fell out, populated when error
    /// reporting was requested.
    pub errors: HashMap<String, String>,
}

// =============================================================================
// Add / remove items
// =============================================================================

impl GroupManager {
    /// Validates and adds tags to a sub-group.
    ///
    /// Client handles are allocated for tags that pass validation; tags
    /// whose add fails afterwards have their registry entries released
    /// again, so the maps stay consistent with the live item set.
    pub(crate) async fn add_items<T: DaTransport>(
        &mut self,
        transport: &T,
        sub_group: &str,
        tags: &[String],
        include_error: bool,
    ) -> DaResult<ItemAddOutcome> {
        if tags.is_empty() {
            return Ok(ItemAddOutcome::default());
        }

        let mut outcome = ItemAddOutcome::default();

        trace!(sub_group, count = tags.len(), "Validate");
        let codes = match transport.validate_items(sub_group, tags).await {
            Ok(codes) if codes.len() == tags.len() => codes,
            Ok(codes) => {
                warn!(
                    sub_group,
                    expected = tags.len(),
                    got = codes.len(),
                    "short validation response, treating all tags as invalid"
                );
                annotate_all(&mut outcome.errors, tags, include_error, "incomplete validation response");
                return Ok(outcome);
            }
            Err(err) => {
                warn!(
                    sub_group,
                    error = %err,
                    "item validation failed, treating all tags as invalid"
                );
                annotate_all(&mut outcome.errors, tags, include_error, &err.to_string());
                return Ok(outcome);
            }
        };

        let mut valid = Vec::with_capacity(tags.len());
        for (tag, code) in tags.iter().zip(&codes) {
            if *code == 0 {
                valid.push(tag.clone());
            } else {
                trace!(tag = %tag, code, "failed validation");
                if include_error {
                    let text = transport.error_string(*code).await;
                    outcome.errors.insert(tag.clone(), trim_remote(&text));
                }
            }
        }
        if valid.is_empty() {
            return Ok(outcome);
        }

        let client_handles = self.registry_mut().allocate(sub_group, &valid);

        trace!(sub_group, count = valid.len(), "AddItems");
        let response = match transport.add_items(sub_group, &valid, &client_handles).await {
            Ok(response) if response.is_complete(valid.len()) => response,
            Ok(_) | Err(_) => {
                // Same degradation policy as the validation call.
                warn!(
                    sub_group,
                    count = valid.len(),
                    "add items failed, treating all tags as invalid"
                );
                for tag in &valid {
                    self.registry_mut().release(sub_group, tag);
                }
                annotate_all(&mut outcome.errors, &valid, include_error, "add items failed");
                return Ok(outcome);
            }
        };

        for (i, tag) in valid.iter().enumerate() {
            if response.error_codes[i] == 0 {
                let handle = response.server_handles[i];
                self.registry_mut().record_server_handle(sub_group, tag, handle);
                outcome.valid_tags.push(tag.clone());
                outcome.server_handles.push(handle);
            } else {
                trace!(tag = %tag, code = response.error_codes[i], "failed add");
                self.registry_mut().release(sub_group, tag);
                if include_error {
                    let text = transport.error_string(response.error_codes[i]).await;
                    outcome.errors.insert(tag.clone(), trim_remote(&text));
                }
            }
        }

        Ok(outcome)
    }

    /// Removes tags from a sub-group.
    ///
    /// Any remote failure, call-level or per-item, is fatal and propagated.
    pub(crate) async fn remove_items<T: DaTransport>(
        &mut self,
        transport: &T,
        sub_group: &str,
        tags: &[String],
    ) -> DaResult<()> {
        if tags.is_empty() {
            return Ok(());
        }

        trace!(sub_group, count = tags.len(), "RemoveItems");
        let handles = self.registry().server_handles_for(sub_group, tags)?;
        let codes = transport.remove_items(sub_group, &handles).await?;

        for (tag, code) in tags.iter().zip(&codes) {
            if *code != 0 {
                let text = transport.error_string(*code).await;
                return Err(RemoteError::operation_failed_with_code(
                    "RemoveItems",
                    format!("item '{}' was not removed: {}", tag, trim_remote(&text)),
                    *code,
                )
                .into());
            }
        }

        for tag in tags {
            self.registry_mut().release(sub_group, tag);
        }
        Ok(())
    }
}

fn annotate_all(
    errors: &mut HashMap<String, String>,
    tags: &[String],
    include_error: bool,
    message: &str,
) {
    if include_error {
        for tag in tags {
            errors.insert(tag.clone(), message.to_string());
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_remote() {
        assert_eq!(trim_remote("The item is unknown\r\n"), "The item is unknown");
        assert_eq!(trim_remote("clean"), "clean");
        assert_eq!(trim_remote("\r\npadded\r\n"), "padded");
    }
}
