//! Transport seam.
//!
//! A [`SafeWs`](crate::SafeWs) never talks to a socket directly. It asks a
//! [`Connector`] for a [`Transport`] and hands it a [`TransportEvents`]
//! sink through which the transport reports its lifecycle.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   open(url, events)   ┌──────────────────┐
//! │                  │──────────────────────►│    Connector     │
//! │     SafeWs       │                       └────────┬─────────┘
//! │                  │◄── opened / closed ──┐         │ Box<dyn Transport>
//! │  state machine   │    failed / message  │         ▼
//! │                  │                      │ ┌──────────────────┐
//! │                  │── send / close ──────┼►│    Transport     │
//! └──────────────────┘                      └─┤  (event loop)    │
//!                                             └──────────────────┘
//! ```
//!
//! Each transport receives a sink tagged with a generation number. Once the
//! wrapper replaces or tears down a transport, events from its sink are
//! ignored.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `tungstenite` | Default connector over `tokio-tungstenite` |

// ============================================================================
// Submodules
// ============================================================================

/// Default connector over `tokio-tungstenite`.
pub mod tungstenite;

#[cfg(test)]
pub(crate) mod mock;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Weak;

use serde::Serialize;

use crate::error::Result;

// ============================================================================
// Re-exports
// ============================================================================

pub use self::tungstenite::{TungsteniteConnector, TungsteniteTransport};

// ============================================================================
// ReadyState
// ============================================================================

/// Readiness reported by a transport.
///
/// Discriminants match the browser `WebSocket.readyState` constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ReadyState {
    /// Handshake in progress.
    Connecting = 0,
    /// Ready to send.
    Open = 1,
    /// Close handshake in progress.
    Closing = 2,
    /// Closed or never opened.
    Closed = 3,
}

impl ReadyState {
    /// Converts a raw discriminant. Unknown values map to `Closed`.
    #[inline]
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }

    /// Returns the raw discriminant.
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

// ============================================================================
// Traits
// ============================================================================

/// A live bidirectional connection.
///
/// Implementations must not block. `send` and `close` are called without
/// any wrapper lock held, so they may report events synchronously.
pub trait Transport: Send + Sync {
    /// Returns the transport's own readiness flag.
    fn ready_state(&self) -> ReadyState;

    /// Queues a text payload.
    ///
    /// # Errors
    ///
    /// Any error is treated by the wrapper as a runtime failure.
    fn send(&self, payload: &str) -> Result<()>;

    /// Starts closing the transport.
    fn close(&self);
}

/// Factory for transports.
pub trait Connector: Send + Sync + 'static {
    /// Instantiates a transport for `url`.
    ///
    /// Must return immediately; the handshake continues in the background
    /// and is reported through `events`.
    ///
    /// # Errors
    ///
    /// An error here is a construction failure: the wrapper moves to
    /// `error` and schedules a retry.
    fn open(&self, url: &str, events: TransportEvents) -> Result<Box<dyn Transport>>;
}

// ============================================================================
// TransportEvents
// ============================================================================

/// Lifecycle notification from a transport to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TransportEvent {
    Opened,
    Closed,
    Failed(String),
    Message(String),
}

/// Receiver side of [`TransportEvents`].
pub(crate) trait TransportListener: Send + Sync {
    fn on_transport_event(&self, generation: u64, event: TransportEvent);
}

/// Sink through which a transport reports its lifecycle.
///
/// Cheap to clone. Holds only a weak reference to its owner, so a transport
/// task outliving its [`SafeWs`](crate::SafeWs) reports into the void.
#[derive(Clone)]
pub struct TransportEvents {
    listener: Weak<dyn TransportListener>,
    generation: u64,
}

impl TransportEvents {
    pub(crate) fn new(listener: Weak<dyn TransportListener>, generation: u64) -> Self {
        Self {
            listener,
            generation,
        }
    }

    /// Reports that the handshake completed.
    pub fn opened(&self) {
        self.dispatch(TransportEvent::Opened);
    }

    /// Reports that the connection closed.
    pub fn closed(&self) {
        self.dispatch(TransportEvent::Closed);
    }

    /// Reports a transport failure.
    pub fn failed(&self, reason: impl Into<String>) {
        self.dispatch(TransportEvent::Failed(reason.into()));
    }

    /// Reports an incoming text payload.
    pub fn message(&self, payload: impl Into<String>) {
        self.dispatch(TransportEvent::Message(payload.into()));
    }

    /// Returns the generation this sink was issued for.
    #[inline]
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    fn dispatch(&self, event: TransportEvent) {
        if let Some(listener) = self.listener.upgrade() {
            listener.on_transport_event(self.generation, event);
        }
    }
}

impl fmt::Debug for TransportEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportEvents")
            .field("generation", &self.generation)
            .field("attached", &(self.listener.strong_count() > 0))
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
