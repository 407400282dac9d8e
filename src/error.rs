//! Error types for the resilient WebSocket wrapper.
//!
//! Errors never escape the public [`SafeWs`](crate::SafeWs) API: connection
//! and send failures are absorbed into state transitions and scheduled
//! retries. This type is used at the transport seam (a [`Connector`] or
//! [`Transport`] reporting a failure) and when validating configuration.
//!
//! [`Connector`]: crate::transport::Connector
//! [`Transport`]: crate::transport::Transport
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::NoRuntime`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`], [`Error::NotReady`] |
//! | Address | [`Error::InvalidUrl`], [`Error::UnsupportedScheme`] |
//! | External | [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::transport::ReadyState;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when connection options are invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// No tokio runtime available.
    ///
    /// Returned when a wrapper is built outside of a runtime context.
    #[error("No tokio runtime available: {message}")]
    NoRuntime {
        /// Description from the runtime lookup.
        message: String,
    },

    // ========================================================================
    // Address Errors
    // ========================================================================
    /// Endpoint address could not be parsed.
    #[error("Invalid URL '{url}': {source}")]
    InvalidUrl {
        /// The rejected address.
        url: String,
        /// Parser error.
        #[source]
        source: url::ParseError,
    },

    /// Endpoint address uses a scheme other than `ws` or `wss`.
    #[error("Unsupported scheme '{scheme}' (expected ws or wss)")]
    UnsupportedScheme {
        /// The rejected scheme.
        scheme: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// WebSocket connection failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Handshake did not complete in time.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// WebSocket connection closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Transport is not in the `Open` ready state.
    #[error("Transport not ready (ready state: {ready_state:?})")]
    NotReady {
        /// Ready state observed at the time of the call.
        ready_state: ReadyState,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a missing runtime error.
    #[inline]
    pub fn no_runtime(message: impl Into<String>) -> Self {
        Self::NoRuntime {
            message: message.into(),
        }
    }

    /// Creates an invalid URL error.
    #[inline]
    pub fn invalid_url(url: impl Into<String>, source: url::ParseError) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            source,
        }
    }

    /// Creates an unsupported scheme error.
    #[inline]
    pub fn unsupported_scheme(scheme: impl Into<String>) -> Self {
        Self::UnsupportedScheme {
            scheme: scheme.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a not-ready error.
    #[inline]
    pub fn not_ready(ready_state: ReadyState) -> Self {
        Self::NotReady { ready_state }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ConnectionTimeout { .. })
    }

    /// Returns `true` if the error came from reaching or using the endpoint.
    ///
    /// Includes address errors; see [`is_recoverable`](Self::is_recoverable)
    /// for the transient subset.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidUrl { .. }
                | Self::UnsupportedScheme { .. }
                | Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::NotReady { .. }
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if a later attempt may succeed.
    ///
    /// Address errors, including tungstenite's own URL errors, are
    /// permanent. The wrapper still retries them under its backoff policy.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::WebSocket(WsError::Url(_)) => false,
            Self::InvalidUrl { .. } | Self::UnsupportedScheme { .. } => false,
            other => other.is_connection_error(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
