//! Safe WebSocket - resilient client connection wrapper.
//!
//! This library wraps a raw WebSocket in a small state machine that never
//! panics or returns errors at the call site, refuses to send on a
//! connection that is not ready, and reconnects with capped exponential
//! backoff.
//!
//! # Architecture
//!
//! - **[`SafeWs`]**: owns one logical connection (at most one transport and
//!   one pending reconnect timer), drives `idle → connecting → open →
//!   closed/error`, and fans lifecycle events out to subscribers
//! - **[`Connector`] / [`Transport`]**: the seam below the wrapper; the
//!   default [`TungsteniteConnector`] runs each socket on a tokio task
//!
//! Key design principles:
//!
//! - Every failure becomes a state transition plus an optional retry
//! - Sends are fire-and-forget: `send_safe` returns `false` and drops the
//!   payload when the connection is not ready
//! - Typed multi-subscriber events instead of single callback slots
//! - All state is per instance; independent connections never interfere
//!
//! # Quick Start
//!
//! ```no_run
//! use safe_ws::{ConnectionEvent, EventKind, Result, SafeWs};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let ws = SafeWs::builder("ws://localhost:8080/chat")
//!         .max_retries(5)
//!         .on_message(|text| println!("<- {text}"))
//!         .build()?;
//!
//!     ws.on(EventKind::Open, |_| println!("connected"));
//!     ws.connect();
//!
//!     // Later, from anywhere:
//!     if !ws.send_safe("hello") {
//!         println!("offline, state = {}", ws.state());
//!     }
//!
//!     ws.close();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`connection`] | [`SafeWs`], options, state machine, events |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`transport`] | Transport traits and the default WebSocket connector |

// ============================================================================
// Modules
// ============================================================================

/// The resilient connection wrapper.
///
/// - [`SafeWs`] - The connection
/// - [`SafeWsBuilder`] - Fluent configuration
/// - [`ConnectionState`] - Lifecycle state
pub mod connection;

/// Error types and result aliases.
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Transport seam and the default WebSocket connector.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Connection types
pub use connection::{
    Backoff, ConnectionEvent, ConnectionOptions, ConnectionState, ConnectionStatus, EventKind,
    SafeWs, SafeWsBuilder, Subscription,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ConnectionId, SubscriptionId};

// Transport types
pub use transport::{Connector, ReadyState, Transport, TransportEvents, TungsteniteConnector};
