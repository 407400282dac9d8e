//! Connection state machine.
//!
//! ```text
//!            connect()             transport open
//!   Idle ─────────────► Connecting ───────────────► Open
//!                        │    ▲  ▲                  │  │
//!          error/close   │    │  │ scheduled retry  │  │ error
//!                        ▼    │  │                  │  ▼
//!                 Closed/Error ──┘◄─────────────────┘ Error
//!                                      close
//!
//!   any state ──close()──► Closed
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of a [`SafeWs`](crate::SafeWs).
///
/// Exactly one value holds at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Constructed, never connected.
    #[default]
    Idle,
    /// Transport instantiated, handshake in progress.
    Connecting,
    /// Transport open, sends are permitted.
    Open,
    /// Transport closed by the remote end or by [`SafeWs::close`](crate::SafeWs::close).
    Closed,
    /// Transport failed to construct, errored, or failed to send.
    Error,
}

impl ConnectionState {
    /// Returns the lowercase name of the state.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Error => "error",
        }
    }

    /// Returns `true` if a connection attempt is in flight or established.
    ///
    /// [`SafeWs::connect`](crate::SafeWs::connect) is a no-op in these states.
    #[inline]
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }

    /// Returns `true` if `next` is a legal successor of `self`.
    ///
    /// `Closed` is reachable from every state because a manual close may
    /// happen at any time. A transport that closes before it ever opened
    /// moves `Connecting` to `Closed` through the same edge.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (_, Self::Closed)
                | (Self::Idle, Self::Connecting)
                | (Self::Connecting, Self::Open)
                | (Self::Connecting, Self::Error)
                | (Self::Open, Self::Error)
                | (Self::Error, Self::Connecting)
                | (Self::Closed, Self::Connecting)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Tests
// ============================================================================
