// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Session-facing types: handle and transaction identifiers, data source
//! selection, session configuration and the read/write option and result
//! records.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use opcflow_core::{Quality, Value};

use crate::error::{ConfigurationError, DaResult};

// =============================================================================
// Handles
// =============================================================================

/// Session-local identifier for an item within a sub-group.
///
/// Handles are assigned monotonically per sub-group and map 1:1 to a tag
/// for the lifetime of that item's subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClientHandle(pub u32);

impl ClientHandle {
    /// Returns the raw handle value.
    #[inline]
    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch-{}", self.0)
    }
}

impl From<u32> for ClientHandle {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Opaque item identifier assigned by the remote source when an item is
/// added, required for sync read/write and removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerHandle(pub u32);

impl ServerHandle {
    /// Returns the raw handle value.
    #[inline]
    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ServerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sh-{}", self.0)
    }
}

impl From<u32> for ServerHandle {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

// =============================================================================
// Transactions
// =============================================================================

/// Correlation token for an outstanding asynchronous refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub u16);

impl TransactionId {
    /// Returns the raw transaction value.
    #[inline]
    pub const fn value(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx-{}", self.0)
    }
}

/// Wrapping allocator for transaction ids.
///
/// The session processes asynchronous refreshes serially, so at most one
/// allocated id is outstanding at a time. The successor of `0xFFFF` is 0.
#[derive(Debug, Default)]
pub struct TransactionCounter {
    current: u16,
}

impl TransactionCounter {
    /// Creates a counter whose first allocation yields 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a counter positioned at the given value.
    pub fn starting_at(current: u16) -> Self {
        Self { current }
    }

    /// Allocates the next transaction id.
    pub fn next(&mut self) -> TransactionId {
        self.current = if self.current >= 0xFFFF {
            0
        } else {
            self.current + 1
        };
        TransactionId(self.current)
    }
}

// =============================================================================
// DataSource
// =============================================================================

/// Where a read should take its values from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// The server's cache.
    Cache,

    /// The underlying device.
    Device,

    /// Cache for pre-existing, unmodified groups; device otherwise.
    #[default]
    Hybrid,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cache => write!(f, "cache"),
            Self::Device => write!(f, "device"),
            Self::Hybrid => write!(f, "hybrid"),
        }
    }
}

// =============================================================================
// SessionConfig
// =============================================================================

/// Session-wide defaults for read and write calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Wait window for asynchronous refresh callbacks.
    #[serde(default = "default_timeout")]
    #[serde(with = "humantime_serde")]
    pub default_timeout: Duration,

    /// Default data source for reads.
    #[serde(default)]
    pub default_source: DataSource,

    /// Default chunk size for splitting large tag sets into sub-groups.
    #[serde(default)]
    pub default_size: Option<usize>,

    /// Default pause applied between consecutive sub-groups of one call.
    #[serde(default)]
    #[serde(with = "humantime_serde::option")]
    pub default_pause: Option<Duration>,

    /// Default group update rate requested from the server.
    ///
    /// `None` leaves the server default in effect. Synchronous reads always
    /// use the server default.
    #[serde(default)]
    #[serde(with = "humantime_serde::option")]
    pub update_rate: Option<Duration>,
}

fn default_timeout() -> Duration {
    Duration::from_secs(5)
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_timeout: default_timeout(),
            default_source: DataSource::Hybrid,
            default_size: None,
            default_pause: None,
            update_rate: None,
        }
    }
}

impl SessionConfig {
    /// Returns a builder with default settings.
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    /// Validates the configuration.
    pub fn validate(&self) -> DaResult<()> {
        if self.default_timeout.is_zero() {
            return Err(ConfigurationError::invalid(
                "default_timeout",
                "must be greater than 0",
            )
            .into());
        }
        if self.default_size == Some(0) {
            return Err(
                ConfigurationError::invalid("default_size", "must be greater than 0").into(),
            );
        }
        Ok(())
    }
}

/// Builder for [`SessionConfig`].
#[derive(Debug, Clone, Default)]
pub struct SessionConfigBuilder {
    timeout: Option<Duration>,
    source: Option<DataSource>,
    size: Option<usize>,
    pause: Option<Duration>,
    update_rate: Option<Duration>,
}

impl SessionConfigBuilder {
    /// Sets the callback wait window.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the default data source.
    pub fn source(mut self, source: DataSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Sets the default sub-group chunk size.
    pub fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    /// Sets the default inter-sub-group pause.
    pub fn pause(mut self, pause: Duration) -> Self {
        self.pause = Some(pause);
        self
    }

    /// Sets the default group update rate.
    pub fn update_rate(mut self, rate: Duration) -> Self {
        self.update_rate = Some(rate);
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> DaResult<SessionConfig> {
        let defaults = SessionConfig::default();
        let config = SessionConfig {
            default_timeout: self.timeout.unwrap_or(defaults.default_timeout),
            default_source: self.source.unwrap_or(defaults.default_source),
            default_size: self.size.or(defaults.default_size),
            default_pause: self.pause.or(defaults.default_pause),
            update_rate: self.update_rate.or(defaults.update_rate),
        };
        config.validate()?;
        Ok(config)
    }
}

// =============================================================================
// ReadOptions
// =============================================================================

/// Options controlling one read call.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Persistent group name; `None` creates an anonymous single-use group.
    pub group: Option<String>,

    /// Chunk size for splitting the tag set into sub-groups.
    pub size: Option<usize>,

    /// Pause between consecutive sub-groups.
    pub pause: Option<Duration>,

    /// Requested data source.
    pub source: DataSource,

    /// Group update rate requested at group creation.
    pub update_rate: Option<Duration>,

    /// Wait window for the asynchronous refresh callback.
    pub timeout: Duration,

    /// Use the synchronous read protocol.
    pub sync: bool,

    /// Attach per-tag remote error strings to the result rows.
    ///
    /// Per-tag error detail is only available on the synchronous path, so
    /// this forces synchronous mode.
    pub include_error: bool,

    /// Reconcile an existing group's item set with the requested tags
    /// before reading.
    pub rebuild: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self::from_config(&SessionConfig::default())
    }
}

impl ReadOptions {
    /// Creates options seeded from session defaults.
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            group: None,
            size: config.default_size,
            pause: config.default_pause,
            source: config.default_source,
            update_rate: config.update_rate,
            timeout: config.default_timeout,
            sync: false,
            include_error: false,
            rebuild: false,
        }
    }

    /// Binds the read to a persistent named group.
    pub fn group(mut self, name: impl Into<String>) -> Self {
        self.group = Some(name.into());
        self
    }

    /// Sets the sub-group chunk size.
    pub fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    /// Sets the pause between sub-groups.
    pub fn pause(mut self, pause: Duration) -> Self {
        self.pause = Some(pause);
        self
    }

    /// Sets the requested data source.
    pub fn source(mut self, source: DataSource) -> Self {
        self.source = source;
        self
    }

    /// Sets the group update rate.
    pub fn update_rate(mut self, rate: Duration) -> Self {
        self.update_rate = Some(rate);
        self
    }

    /// Sets the callback wait window.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Selects the synchronous read protocol.
    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    /// Requests per-tag error strings (forces synchronous mode).
    pub fn include_error(mut self, include: bool) -> Self {
        self.include_error = include;
        self
    }

    /// Requests an item-set rebuild before reading.
    pub fn rebuild(mut self, rebuild: bool) -> Self {
        self.rebuild = rebuild;
        self
    }

    /// The protocol actually used: `include_error` forces synchronous mode.
    #[inline]
    pub fn effective_sync(&self) -> bool {
        self.sync || self.include_error
    }

    /// The update rate actually requested: synchronous reads use the
    /// server default.
    #[inline]
    pub fn effective_update_rate(&self) -> Option<Duration> {
        if self.effective_sync() {
            None
        } else {
            self.update_rate
        }
    }
}

// =============================================================================
// WriteOptions
// =============================================================================

/// Options controlling one write call.
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// Chunk size for splitting the pair set into transient groups.
    pub size: Option<usize>,

    /// Pause between consecutive chunks.
    pub pause: Option<Duration>,

    /// Attach per-tag remote error strings to the result rows.
    pub include_error: bool,
}

impl WriteOptions {
    /// Creates options seeded from session defaults.
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            size: config.default_size,
            pause: config.default_pause,
            include_error: false,
        }
    }

    /// Sets the chunk size.
    pub fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    /// Sets the pause between chunks.
    pub fn pause(mut self, pause: Duration) -> Self {
        self.pause = Some(pause);
        self
    }

    /// Requests per-tag error strings.
    pub fn include_error(mut self, include: bool) -> Self {
        self.include_error = include;
        self
    }
}

// =============================================================================
// Result records
// =============================================================================

/// One row of a read result, in request order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagReading {
    /// The requested tag name.
    pub tag: String,

    /// The observed value; `None` when the tag produced no usable value.
    pub value: Option<Value>,

    /// Quality of the observation; [`Quality::Error`] when unusable.
    pub quality: Quality,

    /// Stringified source timestamp, when one was delivered.
    pub timestamp: Option<String>,

    /// Remote error string, populated when error reporting was requested.
    pub error: Option<String>,
}

impl TagReading {
    /// Creates a row for a tag with no usable value.
    pub fn error_row(tag: impl Into<String>, error: Option<String>) -> Self {
        Self {
            tag: tag.into(),
            value: None,
            quality: Quality::Error,
            timestamp: None,
            error,
        }
    }

    /// Returns `true` if this row carries a usable value.
    #[inline]
    pub fn is_usable(&self) -> bool {
        self.quality.is_usable()
    }
}

/// Outcome of one write, per submitted pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteStatus {
    /// Validation, add and write all succeeded.
    Success,

    /// The write failed at some stage.
    Error,
}

impl fmt::Display for WriteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "Success"),
            Self::Error => write!(f, "Error"),
        }
    }
}

/// One row of a write result, in submission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteOutcome {
    /// The submitted tag name.
    pub tag: String,

    /// Whether the write succeeded for this tag.
    pub status: WriteStatus,

    /// Remote error string, populated when error reporting was requested.
    pub error: Option<String>,
}

// =============================================================================
// Tests
// =============================================================================
