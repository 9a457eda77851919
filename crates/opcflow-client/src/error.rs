// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Session error types.
//!
//! Errors are grouped by the stage they arise in:
//!
//! ```text
//! DaError
//! ├── Request        - malformed input, rejected before any remote call
//! ├── Remote         - a remote primitive failed as a whole
//! ├── Callback       - asynchronous refresh correlation failures
//! ├── State          - handle bookkeeping inconsistencies
//! └── Configuration  - invalid session settings
//! ```
//!
//! Per-tag failures (a tag that fails validation, add or write) are never
//! errors at this level; they surface as `Error` rows in the read/write
//! results, optionally annotated with the remote error string.

use std::time::Duration;

use thiserror::Error;

use crate::types::TransactionId;

/// Convenience alias for results using [`DaError`].
pub type DaResult<T> = Result<T, DaError>;

// =============================================================================
// DaError - Main Error Type
// =============================================================================

/// The main error type for session operations.
#[derive(Debug, Error)]
pub enum DaError {
    /// Malformed request, rejected before any remote call.
    #[error("{0}")]
    Request(#[from] RequestError),

    /// A remote primitive failed as a whole.
    #[error("{0}")]
    Remote(#[from] RemoteError),

    /// Asynchronous refresh correlation failure.
    #[error("{0}")]
    Callback(#[from] CallbackError),

    /// Handle bookkeeping inconsistency.
    #[error("{0}")]
    State(#[from] StateError),

    /// Invalid session settings.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),
}

impl DaError {
    /// Creates a remote operation failure with the remote-supplied text.
    pub fn remote(operation: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Remote(RemoteError::operation_failed(operation, detail))
    }

    /// Creates a not-connected error.
    pub fn not_connected() -> Self {
        Self::Remote(RemoteError::NotConnected)
    }

    /// Creates a callback timeout error.
    pub fn callback_timeout(timeout: Duration, transaction: TransactionId) -> Self {
        Self::Callback(CallbackError::Timeout {
            timeout,
            transaction,
        })
    }

    /// Returns the error category for logging and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Request(_) => "request",
            Self::Remote(_) => "remote",
            Self::Callback(_) => "callback",
            Self::State(_) => "state",
            Self::Configuration(_) => "configuration",
        }
    }

    /// Returns `true` if a retry of the same call may succeed.
    ///
    /// Request shape and bookkeeping errors are deterministic; remote and
    /// correlation failures are typically transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request(_) | Self::State(_) | Self::Configuration(_) => false,
            Self::Remote(e) => e.is_retryable(),
            Self::Callback(e) => e.is_retryable(),
        }
    }
}

// =============================================================================
// RequestError
// =============================================================================

/// Malformed input, raised before any remote call is made.
#[derive(Debug, Error)]
pub enum RequestError {
    /// A health pseudo-tag was passed to the data-access session.
    #[error(
        "health tag '{tag}' is handled by the health monitor, not the data-access session"
    )]
    HealthTag {
        /// The offending tag name.
        tag: String,
    },

    /// Health pseudo-tags and process tags in the same request.
    #[error("system health and process tags cannot be included in the same request")]
    MixedTagSpaces,

    /// A tag name was empty.
    #[error("tag names must not be empty")]
    EmptyTagName,
}

impl RequestError {
    /// Creates a health tag rejection.
    pub fn health_tag(tag: impl Into<String>) -> Self {
        Self::HealthTag { tag: tag.into() }
    }
}

// =============================================================================
// RemoteError
// =============================================================================

/// A remote primitive failed as a whole, as opposed to per-tag error codes.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The remote source reported a call-level failure.
    #[error("{operation}: {detail}")]
    OperationFailed {
        /// The primitive that failed (e.g. "AddGroup", "SyncRead").
        operation: String,
        /// Remote-supplied error text.
        detail: String,
        /// Remote error code, when one was reported.
        code: Option<i32>,
    },

    /// The session is not connected to a remote source.
    #[error("not connected to an OPC server")]
    NotConnected,
}

impl RemoteError {
    /// Creates a call-level operation failure.
    pub fn operation_failed(operation: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::OperationFailed {
            operation: operation.into(),
            detail: detail.into(),
            code: None,
        }
    }

    /// Creates a call-level operation failure carrying the remote code.
    pub fn operation_failed_with_code(
        operation: impl Into<String>,
        detail: impl Into<String>,
        code: i32,
    ) -> Self {
        Self::OperationFailed {
            operation: operation.into(),
            detail: detail.into(),
            code: Some(code),
        }
    }

    /// Returns `true` if a retry of the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NotConnected | Self::OperationFailed { .. })
    }
}

// =============================================================================
// CallbackError
// =============================================================================

/// Asynchronous refresh correlation failures.
#[derive(Debug, Error)]
pub enum CallbackError {
    /// No callback with the expected transaction id arrived in time.
    #[error("Callback: timeout waiting for data ({timeout:?}, {transaction})")]
    Timeout {
        /// The configured wait window.
        timeout: Duration,
        /// The transaction that never completed.
        transaction: TransactionId,
    },

    /// The event channel was closed by the delivery context.
    #[error("callback channel closed by the event source")]
    ChannelClosed,
}

impl CallbackError {
    /// Returns `true` if a retry of the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

// =============================================================================
// StateError
// =============================================================================

/// Handle bookkeeping inconsistencies.
///
/// These indicate the registry and the live item set have diverged, which
/// should not happen while the documented call protocol is followed.
#[derive(Debug, Error)]
pub enum StateError {
    /// No server handle is recorded for a tag expected to be live.
    #[error("no server handle recorded for tag '{tag}' in sub-group '{sub_group}'")]
    MissingServerHandle {
        /// The sub-group whose registry was consulted.
        sub_group: String,
        /// The tag without a recorded handle.
        tag: String,
    },

    /// A single-item call produced no result rows.
    #[error("{operation} produced no result rows")]
    EmptyResult {
        /// The operation that came back empty.
        operation: String,
    },
}

impl StateError {
    /// Creates a missing server handle error.
    pub fn missing_server_handle(
        sub_group: impl Into<String>,
        tag: impl Into<String>,
    ) -> Self {
        Self::MissingServerHandle {
            sub_group: sub_group.into(),
            tag: tag.into(),
        }
    }

    /// Creates an empty-result error.
    pub fn empty_result(operation: impl Into<String>) -> Self {
        Self::EmptyResult {
            operation: operation.into(),
        }
    }
}

// =============================================================================
// ConfigurationError
// =============================================================================

/// Invalid session settings.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// A setting holds a value outside its valid range.
    #[error("invalid setting '{setting}': {reason}")]
    Invalid {
        /// The setting name.
        setting: String,
        /// Why the value was rejected.
        reason: String,
    },
}

impl ConfigurationError {
    /// Creates an invalid-setting error.
    pub fn invalid(setting: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            setting: setting.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
