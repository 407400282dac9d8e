//! Resilient connection module.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`SafeWs`] | The connection wrapper |
//! | [`SafeWsBuilder`] | Fluent configuration builder |
//! | [`ConnectionOptions`] | Retry and handshake options |
//! | [`ConnectionState`] | Lifecycle state machine |
//! | [`Backoff`] | Capped exponential delay policy |
//! | [`EventBus`] | Multi-subscriber event registry |

// ============================================================================
// Submodules
// ============================================================================

/// Capped exponential backoff.
pub mod backoff;

/// Fluent builder pattern for connection configuration.
pub mod builder;

/// The connection wrapper.
pub mod core;

/// Lifecycle events and subscriptions.
pub mod events;

/// Retry and handshake options.
pub mod options;

/// Connection state machine.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use backoff::Backoff;
pub use builder::SafeWsBuilder;
pub use self::core::{ConnectionStatus, SafeWs};
pub use events::{ConnectionEvent, EventBus, EventHandler, EventKind, Subscription};
pub use options::ConnectionOptions;
pub use state::ConnectionState;
