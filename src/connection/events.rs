//! Lifecycle events and the subscriber registry.
//!
//! Every [`SafeWs`](crate::SafeWs) owns one [`EventBus`]. Any number of
//! handlers may subscribe to each [`EventKind`]; a UI widget and a metrics
//! collector can observe the same connection without replacing each
//! other's handler.
//!
//! Handlers are invoked outside of the bus lock, from a snapshot taken at
//! emission time, so a handler may subscribe, unsubscribe or call back into
//! the connection without deadlocking.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::identifiers::SubscriptionId;

use super::state::ConnectionState;

// ============================================================================
// Types
// ============================================================================

/// Event handler callback type.
pub type EventHandler = Arc<dyn Fn(&ConnectionEvent) + Send + Sync>;

/// Handlers registered for one event kind.
type HandlerList = Vec<(SubscriptionId, EventHandler)>;

// ============================================================================
// EventKind
// ============================================================================

/// Kind of lifecycle event a handler subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Transport opened.
    Open,
    /// Transport closed.
    Close,
    /// Transport or connector failure.
    Error,
    /// Text payload received.
    Message,
    /// Any state transition.
    StateChange,
}

impl EventKind {
    /// All event kinds.
    pub const ALL: [Self; 5] = [
        Self::Open,
        Self::Close,
        Self::Error,
        Self::Message,
        Self::StateChange,
    ];

    /// Returns the lowercase name of the kind.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Close => "close",
            Self::Error => "error",
            Self::Message => "message",
            Self::StateChange => "statechange",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ConnectionEvent
// ============================================================================

/// An event delivered to subscribers.
///
/// Emitted after the connection's own bookkeeping is applied: an
/// [`Open`](Self::Open) handler always observes
/// [`SafeWs::state`](crate::SafeWs::state) returning
/// [`ConnectionState::Open`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Transport opened.
    Open,
    /// Transport closed by the remote end.
    Close,
    /// Failure description.
    Error(String),
    /// Text payload received.
    Message(String),
    /// New state after a transition.
    StateChange(ConnectionState),
}

impl ConnectionEvent {
    /// Returns the kind of this event.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Open => EventKind::Open,
            Self::Close => EventKind::Close,
            Self::Error(_) => EventKind::Error,
            Self::Message(_) => EventKind::Message,
            Self::StateChange(_) => EventKind::StateChange,
        }
    }
}

// ============================================================================
// EventBus
// ============================================================================

/// Multi-subscriber registry keyed by [`EventKind`].
#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<FxHashMap<EventKind, HandlerList>>,
}

impl EventBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler and returns its id.
    pub fn subscribe(&self, kind: EventKind, handler: EventHandler) -> SubscriptionId {
        let id = SubscriptionId::next();
        self.handlers
            .write()
            .entry(kind)
            .or_default()
            .push((id, handler));

        trace!(%kind, %id, "Handler subscribed");
        id
    }

    /// Removes a handler. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, kind: EventKind, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write();
        let Some(list) = handlers.get_mut(&kind) else {
            return false;
        };

        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        let removed = list.len() != before;

        if list.is_empty() {
            handlers.remove(&kind);
        }

        if removed {
            trace!(%kind, %id, "Handler unsubscribed");
        }
        removed
    }

    /// Removes every handler.
    pub fn clear(&self) {
        self.handlers.write().clear();
    }

    /// Returns the number of handlers registered for `kind`.
    #[must_use]
    pub fn count(&self, kind: EventKind) -> usize {
        self.handlers.read().get(&kind).map_or(0, Vec::len)
    }

    /// Returns the number of handlers across all kinds.
    #[must_use]
    pub fn total(&self) -> usize {
        self.handlers.read().values().map(Vec::len).sum()
    }

    /// Delivers an event to every handler of its kind.
    pub fn emit(&self, event: &ConnectionEvent) {
        let snapshot: Vec<EventHandler> = match self.handlers.read().get(&event.kind()) {
            Some(list) => list.iter().map(|(_, handler)| Arc::clone(handler)).collect(),
            None => return,
        };

        for handler in snapshot {
            handler(event);
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.total())
            .finish()
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// Guard that unsubscribes its handler when dropped.
///
/// Returned by [`SafeWs::subscribe`](crate::SafeWs::subscribe).
#[must_use = "dropping a Subscription unsubscribes the handler immediately"]
pub struct Subscription {
    bus: Weak<EventBus>,
    kind: EventKind,
    id: SubscriptionId,
}

impl Subscription {
    pub(crate) fn new(bus: &Arc<EventBus>, kind: EventKind, id: SubscriptionId) -> Self {
        Self {
            bus: Arc::downgrade(bus),
            kind,
            id,
        }
    }

    /// Returns the subscription id.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Returns the subscribed event kind.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.kind
    }

    /// Unsubscribes now.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.kind, self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
