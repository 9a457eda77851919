// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Session integration tests.
//!
//! These tests drive [`DaClient`] end to end against an in-memory mock of
//! the remote data source. The mock implements every transport primitive
//! over plain maps, records a call log for asserting which primitives a
//! scenario touched, and answers asynchronous refreshes by pushing events
//! onto the session's channel the way a real event-delivery context would.
//!
//! ```bash
//! cargo test -p opcflow-client --test session_integration
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

use opcflow_client::{
    AddItemsResponse, CallbackError, ClientHandle, DaClient, DaError, DaResult, DaTransport,
    DataSource, Quality, ReadSource, RefreshEvent, ServerHandle, SessionConfig, SyncReadResponse,
    TransactionId, Value, WriteStatus,
};

// =============================================================================
// Error codes used by the mock server
// =============================================================================

/// The item ID is not defined in the server address space.
const ERR_UNKNOWN_ITEM: i32 = 0xC004_0007_u32 as i32;

/// The item could not be added to the group.
const ERR_ADD_FAILED: i32 = 0xC004_0008_u32 as i32;

/// The value could not be written.
const ERR_WRITE_FAILED: i32 = 0xC004_0009_u32 as i32;

/// The item could not be read.
const ERR_READ_FAILED: i32 = 0xC004_000A_u32 as i32;

// =============================================================================
// Mock remote source
// =============================================================================

#[derive(Debug)]
struct ItemRecord {
    tag: String,
    client_handle: ClientHandle,
    server_handle: ServerHandle,
}

#[derive(Debug, Default)]
struct GroupRecord {
    items: Vec<ItemRecord>,
}

#[derive(Debug)]
struct MockState {
    connected: AtomicBool,
    /// Tag to (value, quality bits, timestamp).
    values: RwLock<HashMap<String, (Value, u16, DateTime<Utc>)>>,
    /// Tags that fail validation.
    invalid_tags: RwLock<HashSet<String>>,
    /// Tags that pass validation but fail the add call.
    add_fail_tags: RwLock<HashSet<String>>,
    /// Tags whose sync read reports a per-item error.
    read_fail_tags: RwLock<HashSet<String>>,
    /// Tags whose sync write reports a per-item error.
    write_fail_tags: RwLock<HashSet<String>>,
    /// Groups whose sync read fails as a whole.
    sync_read_fail_groups: RwLock<HashSet<String>>,
    /// When set, the validation call itself fails.
    fail_validate_call: AtomicBool,
    /// When cleared, async refreshes are accepted but never answered.
    respond_to_refresh: AtomicBool,
    /// When set, a stale event precedes every refresh answer.
    stale_event_first: AtomicBool,
    groups: RwLock<HashMap<String, GroupRecord>>,
    next_server_handle: AtomicU32,
    calls: RwLock<Vec<String>>,
    events: mpsc::Sender<RefreshEvent>,
}

/// In-memory stand-in for the remote data source.
#[derive(Clone)]
struct MockSource {
    state: Arc<MockState>,
}

impl MockSource {
    /// Creates a mock and the event receiver its refreshes are answered on.
    fn new() -> (Self, mpsc::Receiver<RefreshEvent>) {
        let (tx, rx) = mpsc::channel(64);
        let source = Self {
            state: Arc::new(MockState {
                connected: AtomicBool::new(false),
                values: RwLock::new(HashMap::new()),
                invalid_tags: RwLock::new(HashSet::new()),
                add_fail_tags: RwLock::new(HashSet::new()),
                read_fail_tags: RwLock::new(HashSet::new()),
                write_fail_tags: RwLock::new(HashSet::new()),
                sync_read_fail_groups: RwLock::new(HashSet::new()),
                fail_validate_call: AtomicBool::new(false),
                respond_to_refresh: AtomicBool::new(true),
                stale_event_first: AtomicBool::new(false),
                groups: RwLock::new(HashMap::new()),
                next_server_handle: AtomicU32::new(100),
                calls: RwLock::new(Vec::new()),
                events: tx,
            }),
        };
        (source, rx)
    }

    fn set_value(&self, tag: &str, value: Value) {
        self.set_value_with_quality(tag, value, 0xC0);
    }

    fn set_value_with_quality(&self, tag: &str, value: Value, quality: u16) {
        self.state
            .values
            .write()
            .unwrap()
            .insert(tag.to_string(), (value, quality, Utc::now()));
    }

    fn value_of(&self, tag: &str) -> Option<Value> {
        self.state
            .values
            .read()
            .unwrap()
            .get(tag)
            .map(|(v, _, _)| v.clone())
    }

    fn set_invalid(&self, tag: &str) {
        self.state
            .invalid_tags
            .write()
            .unwrap()
            .insert(tag.to_string());
    }

    fn set_add_fail(&self, tag: &str) {
        self.state
            .add_fail_tags
            .write()
            .unwrap()
            .insert(tag.to_string());
    }

    fn set_read_fail(&self, tag: &str) {
        self.state
            .read_fail_tags
            .write()
            .unwrap()
            .insert(tag.to_string());
    }

    fn set_write_fail(&self, tag: &str) {
        self.state
            .write_fail_tags
            .write()
            .unwrap()
            .insert(tag.to_string());
    }

    fn fail_sync_read_on(&self, group: &str) {
        self.state
            .sync_read_fail_groups
            .write()
            .unwrap()
            .insert(group.to_string());
    }

    fn fail_validate_call(&self, fail: bool) {
        self.state.fail_validate_call.store(fail, Ordering::SeqCst);
    }

    fn respond_to_refresh(&self, respond: bool) {
        self.state.respond_to_refresh.store(respond, Ordering::SeqCst);
    }

    fn stale_event_first(&self, stale: bool) {
        self.state.stale_event_first.store(stale, Ordering::SeqCst);
    }

    fn group_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.groups.read().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    fn item_tags(&self, group: &str) -> Vec<String> {
        self.state
            .groups
            .read()
            .unwrap()
            .get(group)
            .map(|g| g.items.iter().map(|i| i.tag.clone()).collect())
            .unwrap_or_default()
    }

    fn calls(&self) -> Vec<String> {
        self.state.calls.read().unwrap().clone()
    }

    fn calls_matching(&self, prefix: &str) -> usize {
        self.state
            .calls
            .read()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn clear_calls(&self) {
        self.state.calls.write().unwrap().clear();
    }

    fn log(&self, call: String) {
        self.state.calls.write().unwrap().push(call);
    }

    fn remote_error(operation: &str, detail: &str) -> DaError {
        DaError::remote(operation, detail)
    }
}

fn error_text(code: i32) -> String {
    match code {
        0 => "The operation completed successfully.\r\n".to_string(),
        ERR_UNKNOWN_ITEM => {
            "The item ID is not defined in the server address space.\r\n".to_string()
        }
        ERR_ADD_FAILED => "The item could not be added to the group.\r\n".to_string(),
        ERR_WRITE_FAILED => "The value could not be written.\r\n".to_string(),
        ERR_READ_FAILED => "The item could not be read.\r\n".to_string(),
        other => format!("Unknown error 0x{:08X}", other as u32),
    }
}

#[async_trait]
impl DaTransport for MockSource {
    async fn connect(&mut self) -> DaResult<()> {
        self.log("Connect".to_string());
        self.state.connected.store(true, Ordering::SeqCst);
        // A fresh connection starts with no server-side groups.
        self.state.groups.write().unwrap().clear();
        Ok(())
    }

    async fn disconnect(&mut self) -> DaResult<()> {
        self.log("Disconnect".to_string());
        self.state.connected.store(false, Ordering::SeqCst);
        self.state.groups.write().unwrap().clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }

    async fn add_group(
        &self,
        name: Option<&str>,
        update_rate: Option<Duration>,
    ) -> DaResult<String> {
        let name = match name {
            Some(name) => name.to_string(),
            None => format!("anon-{}", Uuid::new_v4()),
        };
        self.log(format!("AddGroup({}, update: {:?})", name, update_rate));

        let mut groups = self.state.groups.write().unwrap();
        if groups.contains_key(&name) {
            return Err(Self::remote_error("AddGroup", "duplicate group name"));
        }
        groups.insert(name.clone(), GroupRecord::default());
        Ok(name)
    }

    async fn get_group(&self, name: &str) -> DaResult<Option<String>> {
        self.log(format!("GetOPCGroup({})", name));
        let groups = self.state.groups.read().unwrap();
        Ok(groups.contains_key(name).then(|| name.to_string()))
    }

    async fn remove_group(&self, name: &str) -> DaResult<()> {
        self.log(format!("RemoveGroup({})", name));
        let mut groups = self.state.groups.write().unwrap();
        if groups.remove(name).is_none() {
            return Err(Self::remote_error("RemoveGroup", "no such group"));
        }
        Ok(())
    }

    async fn validate_items(&self, group: &str, names: &[String]) -> DaResult<Vec<i32>> {
        self.log(format!("Validate({}, {})", group, names.join(",")));
        if self.state.fail_validate_call.load(Ordering::SeqCst) {
            return Err(Self::remote_error("Validate", "validation unavailable"));
        }
        let invalid = self.state.invalid_tags.read().unwrap();
        Ok(names
            .iter()
            .map(|name| {
                if invalid.contains(name) {
                    ERR_UNKNOWN_ITEM
                } else {
                    0
                }
            })
            .collect())
    }

    async fn add_items(
        &self,
        group: &str,
        names: &[String],
        client_handles: &[ClientHandle],
    ) -> DaResult<AddItemsResponse> {
        self.log(format!("AddItems({}, {})", group, names.join(",")));
        let add_fail = self.state.add_fail_tags.read().unwrap();
        let mut groups = self.state.groups.write().unwrap();
        let record = groups
            .get_mut(group)
            .ok_or_else(|| Self::remote_error("AddItems", "no such group"))?;

        let mut server_handles = Vec::with_capacity(names.len());
        let mut error_codes = Vec::with_capacity(names.len());
        for (name, client_handle) in names.iter().zip(client_handles) {
            if add_fail.contains(name) {
                server_handles.push(ServerHandle(0));
                error_codes.push(ERR_ADD_FAILED);
                continue;
            }
            let handle =
                ServerHandle(self.state.next_server_handle.fetch_add(1, Ordering::SeqCst));
            record.items.push(ItemRecord {
                tag: name.clone(),
                client_handle: *client_handle,
                server_handle: handle,
            });
            server_handles.push(handle);
            error_codes.push(0);
        }
        Ok(AddItemsResponse {
            server_handles,
            error_codes,
        })
    }

    async fn remove_items(
        &self,
        group: &str,
        server_handles: &[ServerHandle],
    ) -> DaResult<Vec<i32>> {
        self.log(format!("RemoveItems({}, {})", group, server_handles.len()));
        let mut groups = self.state.groups.write().unwrap();
        let record = groups
            .get_mut(group)
            .ok_or_else(|| Self::remote_error("RemoveItems", "no such group"))?;

        let mut codes = Vec::with_capacity(server_handles.len());
        for handle in server_handles {
            let before = record.items.len();
            record.items.retain(|item| item.server_handle != *handle);
            codes.push(if record.items.len() < before {
                0
            } else {
                ERR_UNKNOWN_ITEM
            });
        }
        Ok(codes)
    }

    async fn sync_read(
        &self,
        group: &str,
        source: ReadSource,
        server_handles: &[ServerHandle],
    ) -> DaResult<SyncReadResponse> {
        self.log(format!("SyncRead({}, {})", group, source));
        if self
            .state
            .sync_read_fail_groups
            .read()
            .unwrap()
            .contains(group)
        {
            return Err(Self::remote_error("SyncRead", "device not responding"));
        }

        let groups = self.state.groups.read().unwrap();
        let record = groups
            .get(group)
            .ok_or_else(|| Self::remote_error("SyncRead", "no such group"))?;
        let values = self.state.values.read().unwrap();
        let read_fail = self.state.read_fail_tags.read().unwrap();

        let mut response = SyncReadResponse {
            values: Vec::new(),
            error_codes: Vec::new(),
            qualities: Vec::new(),
            timestamps: Vec::new(),
        };
        for handle in server_handles {
            let item = record
                .items
                .iter()
                .find(|item| item.server_handle == *handle)
                .ok_or_else(|| Self::remote_error("SyncRead", "invalid server handle"))?;
            if read_fail.contains(&item.tag) {
                response.values.push(Value::Null);
                response.error_codes.push(ERR_READ_FAILED);
                response.qualities.push(0x00);
                response.timestamps.push(Utc::now());
                continue;
            }
            match values.get(&item.tag) {
                Some((value, quality, timestamp)) => {
                    response.values.push(value.clone());
                    response.error_codes.push(0);
                    response.qualities.push(*quality);
                    response.timestamps.push(*timestamp);
                }
                None => {
                    response.values.push(Value::Null);
                    response.error_codes.push(0);
                    response.qualities.push(0x00);
                    response.timestamps.push(Utc::now());
                }
            }
        }
        Ok(response)
    }

    async fn sync_write(
        &self,
        group: &str,
        server_handles: &[ServerHandle],
        values: &[Value],
    ) -> DaResult<Vec<i32>> {
        self.log(format!("SyncWrite({}, {})", group, server_handles.len()));
        let groups = self.state.groups.read().unwrap();
        let record = groups
            .get(group)
            .ok_or_else(|| Self::remote_error("SyncWrite", "no such group"))?;
        let write_fail = self.state.write_fail_tags.read().unwrap();
        let mut stored = self.state.values.write().unwrap();

        let mut codes = Vec::with_capacity(server_handles.len());
        for (handle, value) in server_handles.iter().zip(values) {
            let item = record
                .items
                .iter()
                .find(|item| item.server_handle == *handle)
                .ok_or_else(|| Self::remote_error("SyncWrite", "invalid server handle"))?;
            if write_fail.contains(&item.tag) {
                codes.push(ERR_WRITE_FAILED);
            } else {
                stored.insert(item.tag.clone(), (value.clone(), 0xC0, Utc::now()));
                codes.push(0);
            }
        }
        Ok(codes)
    }

    async fn async_refresh(
        &self,
        group: &str,
        source: ReadSource,
        transaction: TransactionId,
    ) -> DaResult<()> {
        self.log(format!("AsyncRefresh({}, {}, {})", group, source, transaction));
        if !self.state.respond_to_refresh.load(Ordering::SeqCst) {
            return Ok(());
        }

        let event = {
            let groups = self.state.groups.read().unwrap();
            let record = groups
                .get(group)
                .ok_or_else(|| Self::remote_error("AsyncRefresh", "no such group"))?;
            let values = self.state.values.read().unwrap();

            let mut event = RefreshEvent {
                transaction,
                client_handles: Vec::new(),
                values: Vec::new(),
                qualities: Vec::new(),
                timestamps: Vec::new(),
            };
            for item in &record.items {
                event.client_handles.push(item.client_handle);
                match values.get(&item.tag) {
                    Some((value, quality, timestamp)) => {
                        event.values.push(value.clone());
                        event.qualities.push(*quality);
                        event.timestamps.push(*timestamp);
                    }
                    None => {
                        event.values.push(Value::Null);
                        event.qualities.push(0x00);
                        event.timestamps.push(Utc::now());
                    }
                }
            }
            event
        };

        if self.state.stale_event_first.load(Ordering::SeqCst) {
            let mut stale = event.clone();
            stale.transaction = TransactionId(transaction.value().wrapping_sub(1));
            self.state
                .events
                .send(stale)
                .await
                .map_err(|_| Self::remote_error("AsyncRefresh", "event channel closed"))?;
        }
        self.state
            .events
            .send(event)
            .await
            .map_err(|_| Self::remote_error("AsyncRefresh", "event channel closed"))?;
        Ok(())
    }

    async fn error_string(&self, code: i32) -> String {
        error_text(code)
    }
}

// =============================================================================
// Helpers
// =============================================================================

async fn connected_client() -> (DaClient<MockSource>, MockSource) {
    let (source, events) = MockSource::new();
    let inspector = source.clone();
    let mut client = DaClient::new(source, events);
    client.connect().await.unwrap();
    (client, inspector)
}

fn tags(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

// =============================================================================
// Group lifecycle
// =============================================================================

#[tokio::test]
async fn test_named_group_chunking_creates_sub_groups() {
    let (mut client, mock) = connected_client().await;
    mock.set_value("T1", Value::Int32(1));
    mock.set_value("T2", Value::Int32(2));
    mock.set_value("T3", Value::Int32(3));

    let opts = client.read_options().group("plant").size(2).sync(true);
    let rows = client.read(&tags(&["T1", "T2", "T3"]), &opts).await.unwrap();

    // One row per requested tag, in request order.
    assert_eq!(rows.len(), 3);
    assert_eq!(
        rows.iter().map(|r| r.tag.as_str()).collect::<Vec<_>>(),
        vec!["T1", "T2", "T3"]
    );
    assert_eq!(rows[0].value, Some(Value::Int32(1)));
    assert_eq!(rows[2].value, Some(Value::Int32(3)));
    assert!(rows.iter().all(|r| r.quality == Quality::Good));
    assert!(rows.iter().all(|r| r.timestamp.is_some()));

    // Two sub-groups on the server: [T1, T2] and [T3].
    assert_eq!(mock.group_names(), vec!["plant.0", "plant.1"]);
    assert_eq!(mock.item_tags("plant.0"), tags(&["T1", "T2"]));
    assert_eq!(mock.item_tags("plant.1"), tags(&["T3"]));
    assert_eq!(client.groups(), vec!["plant"]);
}

#[tokio::test]
async fn test_remove_tears_down_all_sub_groups() {
    let (mut client, mock) = connected_client().await;
    mock.set_value("T1", Value::Int32(1));
    mock.set_value("T2", Value::Int32(2));
    mock.set_value("T3", Value::Int32(3));

    let opts = client.read_options().group("plant").size(2).sync(true);
    client.read(&tags(&["T1", "T2", "T3"]), &opts).await.unwrap();

    client.remove(["plant"]).await.unwrap();

    assert!(mock.group_names().is_empty());
    assert!(client.groups().is_empty());
    // No orphaned handle entries for either sub-group.
    let registry = client.group_manager().registry();
    assert_eq!(registry.handle_count("plant.0"), 0);
    assert_eq!(registry.handle_count("plant.1"), 0);

    // Removing an unknown name is a no-op.
    client.remove(["plant"]).await.unwrap();
    client.remove(["never-existed"]).await.unwrap();
}

#[tokio::test]
async fn test_existing_group_fast_path_skips_item_calls() {
    let (mut client, mock) = connected_client().await;
    mock.set_value("T1", Value::Float64(1.5));
    mock.set_value("T2", Value::Float64(2.5));

    let opts = client.read_options().group("fast").sync(true);
    client.read(&tags(&["T1", "T2"]), &opts).await.unwrap();
    // Creation goes to the device under the hybrid default.
    assert_eq!(mock.calls_matching("SyncRead(fast.0, device)"), 1);

    mock.clear_calls();
    let rows = client.read(&tags(&["T1", "T2"]), &opts).await.unwrap();
    assert_eq!(rows.len(), 2);

    // Reuse touches neither the group nor the item tables, and the hybrid
    // source resolves to the cache for the unmodified group.
    assert_eq!(mock.calls_matching("AddGroup"), 0);
    assert_eq!(mock.calls_matching("GetOPCGroup"), 0);
    assert_eq!(mock.calls_matching("Validate"), 0);
    assert_eq!(mock.calls_matching("AddItems"), 0);
    assert_eq!(mock.calls_matching("SyncRead(fast.0, cache)"), 1);
}

#[tokio::test]
async fn test_rebuild_diffs_item_set() {
    let (mut client, mock) = connected_client().await;
    mock.set_value("T1", Value::Int32(1));
    mock.set_value("T2", Value::Int32(2));
    mock.set_value("T3", Value::Int32(3));

    let opts = client.read_options().group("g").sync(true);
    client.read(&tags(&["T1", "T2"]), &opts).await.unwrap();

    mock.clear_calls();
    let opts = opts.rebuild(true);
    let rows = client.read(&tags(&["T1", "T3"]), &opts).await.unwrap();

    assert_eq!(
        rows.iter().map(|r| r.tag.as_str()).collect::<Vec<_>>(),
        vec!["T1", "T3"]
    );
    assert_eq!(mock.item_tags("g.0"), tags(&["T1", "T3"]));
    // Only the difference moved over the wire.
    assert!(mock.calls().contains(&"AddItems(g.0, T3)".to_string()));
    assert_eq!(mock.calls_matching("RemoveItems"), 1);
    // Freshly added items have no cached value, so the read bypasses the
    // cache even though the group pre-existed.
    assert_eq!(mock.calls_matching("SyncRead(g.0, device)"), 1);
}

#[tokio::test]
async fn test_rebuild_is_idempotent() {
    let (mut client, mock) = connected_client().await;
    mock.set_value("T1", Value::Int32(1));
    mock.set_value("T3", Value::Int32(3));

    let opts = client.read_options().group("g").sync(true);
    client.read(&tags(&["T1", "T2"]), &opts).await.unwrap();

    let opts = opts.rebuild(true);
    client.read(&tags(&["T1", "T3"]), &opts).await.unwrap();

    // A second rebuild with the same tag set has nothing to reconcile.
    mock.clear_calls();
    client.read(&tags(&["T1", "T3"]), &opts).await.unwrap();
    assert_eq!(mock.calls_matching("AddItems"), 0);
    assert_eq!(mock.calls_matching("RemoveItems"), 0);
}

#[tokio::test]
async fn test_anonymous_group_is_self_cleaning() {
    let (mut client, mock) = connected_client().await;
    mock.set_value("T1", Value::Bool(true));

    let opts = client.read_options().sync(true);
    let rows = client.read(&tags(&["T1"]), &opts).await.unwrap();
    assert_eq!(rows[0].value, Some(Value::Bool(true)));

    // The transient group is gone on both sides.
    assert!(mock.group_names().is_empty());
    assert!(client.groups().is_empty());
    assert_eq!(mock.calls_matching("AddGroup"), 1);
    assert_eq!(mock.calls_matching("RemoveGroup"), 1);
}

#[tokio::test]
async fn test_reconnect_invalidates_group_caches() {
    let (mut client, mock) = connected_client().await;
    mock.set_value("T1", Value::Int32(1));

    let opts = client.read_options().group("g").sync(true);
    client.read(&tags(&["T1"]), &opts).await.unwrap();
    assert_eq!(client.groups(), vec!["g"]);

    client.connect().await.unwrap();
    assert!(client.groups().is_empty());

    // The next read must recreate the group rather than reuse stale state.
    mock.clear_calls();
    client.read(&tags(&["T1"]), &opts).await.unwrap();
    assert_eq!(mock.calls_matching("AddGroup"), 1);
}

#[tokio::test]
async fn test_close_removes_groups_and_disconnects() {
    let (mut client, mock) = connected_client().await;
    mock.set_value("T1", Value::Int32(1));

    let opts = client.read_options().group("g").sync(true);
    client.read(&tags(&["T1"]), &opts).await.unwrap();

    client.close().await.unwrap();
    assert!(!client.is_connected());
    assert!(client.groups().is_empty());
    assert!(mock.group_names().is_empty());
}

// =============================================================================
// Synchronous reads
// =============================================================================

#[tokio::test]
async fn test_invalid_tag_yields_error_row() {
    let (mut client, mock) = connected_client().await;
    mock.set_value("T1", Value::Int32(1));
    mock.set_invalid("TX");

    let opts = client.read_options().sync(true).include_error(true);
    let rows = client.read(&tags(&["T1", "TX"]), &opts).await.unwrap();

    assert_eq!(rows[0].value, Some(Value::Int32(1)));
    assert_eq!(rows[0].quality, Quality::Good);

    assert_eq!(rows[1].value, None);
    assert_eq!(rows[1].quality, Quality::Error);
    assert_eq!(rows[1].timestamp, None);
    // Remote error text attached, with the trailing line noise stripped.
    let error = rows[1].error.as_deref().unwrap();
    assert!(error.contains("not defined in the server address space"));
    assert!(!error.ends_with('\n'));
}

#[tokio::test]
async fn test_add_failure_yields_error_row() {
    let (mut client, mock) = connected_client().await;
    mock.set_value("T1", Value::Int32(1));
    mock.set_add_fail("T2");

    let opts = client.read_options().sync(true).include_error(true);
    let rows = client.read(&tags(&["T1", "T2"]), &opts).await.unwrap();

    assert_eq!(rows[0].quality, Quality::Good);
    assert_eq!(rows[1].quality, Quality::Error);
    assert!(rows[1]
        .error
        .as_deref()
        .unwrap()
        .contains("could not be added"));
}

#[tokio::test]
async fn test_per_tag_read_error_never_returns_stale_value() {
    let (mut client, mock) = connected_client().await;
    mock.set_value("T1", Value::Int32(1));
    mock.set_value("T2", Value::Int32(2));
    mock.set_read_fail("T2");

    let opts = client.read_options().sync(true);
    let rows = client.read(&tags(&["T1", "T2"]), &opts).await.unwrap();

    assert_eq!(rows[0].value, Some(Value::Int32(1)));
    assert_eq!(rows[1].value, None);
    assert_eq!(rows[1].quality, Quality::Error);
    assert_eq!(rows[1].timestamp, None);
}

#[tokio::test]
async fn test_quality_bits_map_to_enumeration() {
    let (mut client, mock) = connected_client().await;
    mock.set_value_with_quality("T1", Value::Int32(1), 0x40);

    let opts = client.read_options().sync(true);
    let rows = client.read(&tags(&["T1"]), &opts).await.unwrap();

    // An uncertain value is still delivered, with its quality decoded.
    assert_eq!(rows[0].value, Some(Value::Int32(1)));
    assert_eq!(rows[0].quality, Quality::Uncertain);
    assert_eq!(format!("{}", rows[0].quality), "Uncertain");
}

#[tokio::test]
async fn test_datetime_values_are_stringified() {
    let (mut client, mock) = connected_client().await;
    let ts = Utc::now();
    mock.set_value("T1", Value::DateTime(ts));

    let opts = client.read_options().sync(true);
    let rows = client.read(&tags(&["T1"]), &opts).await.unwrap();
    assert_eq!(rows[0].value, Some(Value::String(ts.to_rfc3339())));
}

#[tokio::test]
async fn test_read_one_returns_bare_record() {
    let (mut client, mock) = connected_client().await;
    mock.set_value("T1", Value::Float64(20.5));

    let opts = client.read_options().sync(true);
    let reading = client.read_one("T1", &opts).await.unwrap();
    assert_eq!(reading.tag, "T1");
    assert_eq!(reading.value, Some(Value::Float64(20.5)));
    assert_eq!(reading.quality, Quality::Good);
}

#[tokio::test]
async fn test_sync_read_failure_aborts_whole_call() {
    let (mut client, mock) = connected_client().await;
    mock.set_value("T1", Value::Int32(1));
    mock.set_value("T2", Value::Int32(2));
    mock.fail_sync_read_on("g.1");

    let opts = client.read_options().group("g").size(1).sync(true);
    let err = client.read(&tags(&["T1", "T2"]), &opts).await.unwrap_err();
    assert!(matches!(err, DaError::Remote(_)));
    assert!(format!("{}", err).contains("device not responding"));
}

#[tokio::test]
async fn test_validation_call_failure_degrades_to_all_invalid() {
    let (mut client, mock) = connected_client().await;
    mock.set_value("T1", Value::Int32(1));
    mock.fail_validate_call(true);

    // The read itself succeeds; every tag comes back as an error row.
    let opts = client.read_options().sync(true);
    let rows = client.read(&tags(&["T1"]), &opts).await.unwrap();
    assert_eq!(rows[0].value, None);
    assert_eq!(rows[0].quality, Quality::Error);
}

#[tokio::test]
async fn test_health_tags_are_rejected_before_any_remote_call() {
    let (mut client, mock) = connected_client().await;
    mock.clear_calls();

    let opts = client.read_options().sync(true);
    let err = client.read(&tags(&["@MEM_FREE"]), &opts).await.unwrap_err();
    assert!(matches!(err, DaError::Request(_)));

    let err = client
        .read(&tags(&["T1", "@MEM_FREE"]), &opts)
        .await
        .unwrap_err();
    assert!(matches!(err, DaError::Request(_)));

    assert!(mock.calls().is_empty());
}

// =============================================================================
// Asynchronous reads
// =============================================================================

#[tokio::test]
async fn test_async_read_correlates_callback() {
    let (mut client, mock) = connected_client().await;
    mock.set_value("T1", Value::Int32(11));
    mock.set_value("T2", Value::Int32(22));

    let opts = client.read_options().group("g");
    let rows = client.read(&tags(&["T1", "T2"]), &opts).await.unwrap();

    assert_eq!(rows[0].value, Some(Value::Int32(11)));
    assert_eq!(rows[1].value, Some(Value::Int32(22)));
    assert!(rows.iter().all(|r| r.quality == Quality::Good));
    assert_eq!(mock.calls_matching("AsyncRefresh(g.0, device"), 1);

    // The reused group refreshes from the cache under hybrid.
    mock.clear_calls();
    let rows = client.read(&tags(&["T1", "T2"]), &opts).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(mock.calls_matching("AsyncRefresh(g.0, cache"), 1);
}

#[tokio::test]
async fn test_async_read_discards_stale_transaction() {
    let (mut client, mock) = connected_client().await;
    mock.set_value("T1", Value::Int32(5));
    mock.stale_event_first(true);

    let opts = client.read_options();
    let rows = client.read(&tags(&["T1"]), &opts).await.unwrap();
    assert_eq!(rows[0].value, Some(Value::Int32(5)));
}

#[tokio::test(start_paused = true)]
async fn test_async_read_times_out_after_configured_window() {
    let (mut client, mock) = connected_client().await;
    mock.set_value("T1", Value::Int32(5));
    mock.respond_to_refresh(false);

    let timeout = Duration::from_millis(500);
    let opts = client.read_options().timeout(timeout);

    let start = tokio::time::Instant::now();
    let err = client.read(&tags(&["T1"]), &opts).await.unwrap_err();
    let elapsed = start.elapsed();

    assert!(matches!(
        err,
        DaError::Callback(CallbackError::Timeout { .. })
    ));
    assert!(format!("{}", err).starts_with("Callback: timeout waiting for data"));
    // Under the paused clock the wait covers exactly the configured window.
    assert!(elapsed >= timeout);
    assert!(elapsed < timeout + Duration::from_millis(50));

    // The anonymous group is still torn down on the failure path.
    assert!(mock.group_names().is_empty());
}

#[tokio::test]
async fn test_include_error_forces_sync_protocol() {
    let (mut client, mock) = connected_client().await;
    mock.set_value("T1", Value::Int32(1));

    let opts = client.read_options().include_error(true);
    let rows = client.read(&tags(&["T1"]), &opts).await.unwrap();

    assert_eq!(rows[0].error.as_deref(), Some("The operation completed successfully."));
    assert_eq!(mock.calls_matching("AsyncRefresh"), 0);
    assert_eq!(mock.calls_matching("SyncRead"), 1);
}

// =============================================================================
// Writes
// =============================================================================

#[tokio::test]
async fn test_write_reports_per_tag_status() {
    let (mut client, mock) = connected_client().await;
    mock.set_invalid("T2");

    let pairs = vec![
        ("T1".to_string(), Value::Int32(5)),
        ("T2".to_string(), Value::String("bad".into())),
    ];
    let rows = client.write(&pairs, &client.write_options()).await.unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].tag, "T1");
    assert_eq!(rows[0].status, WriteStatus::Success);
    assert_eq!(rows[1].tag, "T2");
    assert_eq!(rows[1].status, WriteStatus::Error);

    // The valid tag's value landed on the server.
    assert_eq!(mock.value_of("T1"), Some(Value::Int32(5)));
    assert_eq!(mock.value_of("T2"), None);
    // The transient group did not survive the call.
    assert!(mock.group_names().is_empty());
}

#[tokio::test]
async fn test_write_chunking_uses_one_transient_group_per_chunk() {
    let (mut client, mock) = connected_client().await;

    let pairs = vec![
        ("T1".to_string(), Value::Int32(1)),
        ("T2".to_string(), Value::Int32(2)),
        ("T3".to_string(), Value::Int32(3)),
    ];
    let opts = client.write_options().size(2);
    let rows = client.write(&pairs, &opts).await.unwrap();

    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.status == WriteStatus::Success));
    assert_eq!(mock.calls_matching("AddGroup"), 2);
    assert_eq!(mock.calls_matching("SyncWrite"), 2);
    assert_eq!(mock.calls_matching("RemoveGroup"), 2);
    assert!(mock.group_names().is_empty());
}

#[tokio::test]
async fn test_write_failure_is_reported_with_error_string() {
    let (mut client, mock) = connected_client().await;
    mock.set_write_fail("T2");

    let pairs = vec![
        ("T1".to_string(), Value::Int32(1)),
        ("T2".to_string(), Value::Int32(2)),
    ];
    let opts = client.write_options().include_error(true);
    let rows = client.write(&pairs, &opts).await.unwrap();

    assert_eq!(rows[0].status, WriteStatus::Success);
    assert_eq!(rows[1].status, WriteStatus::Error);
    assert!(rows[1]
        .error
        .as_deref()
        .unwrap()
        .contains("could not be written"));
}

#[tokio::test]
async fn test_write_one_returns_bare_outcome() {
    let (mut client, mock) = connected_client().await;

    let outcome = client
        .write_one("T1", Value::Float64(3.25), &client.write_options())
        .await
        .unwrap();
    assert_eq!(outcome.tag, "T1");
    assert_eq!(outcome.status, WriteStatus::Success);
    assert_eq!(mock.value_of("T1"), Some(Value::Float64(3.25)));
}

#[tokio::test]
async fn test_write_rejects_health_tags() {
    let (mut client, mock) = connected_client().await;
    mock.clear_calls();

    let pairs = vec![("@CPU".to_string(), Value::Int32(1))];
    let err = client
        .write(&pairs, &client.write_options())
        .await
        .unwrap_err();
    assert!(matches!(err, DaError::Request(_)));
    assert!(mock.calls().is_empty());
}

// =============================================================================
// Configuration defaults
// =============================================================================

#[tokio::test]
async fn test_session_config_seeds_options() {
    let (source, events) = MockSource::new();
    let inspector = source.clone();
    let config = SessionConfig::builder()
        .timeout(Duration::from_secs(2))
        .source(DataSource::Device)
        .size(1)
        .build()
        .unwrap();
    let mut client = DaClient::with_config(source, events, config);
    client.connect().await.unwrap();

    let opts = client.read_options();
    assert_eq!(opts.timeout, Duration::from_secs(2));
    assert_eq!(opts.source, DataSource::Device);
    assert_eq!(opts.size, Some(1));

    inspector.set_value("T1", Value::Int32(1));
    inspector.set_value("T2", Value::Int32(2));
    let opts = opts.group("g").sync(true);
    client.read(&tags(&["T1", "T2"]), &opts).await.unwrap();

    // The configured chunk size of 1 produced one sub-group per tag.
    assert_eq!(inspector.group_names(), vec!["g.0", "g.1"]);
}
