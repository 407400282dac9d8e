//! The resilient connection wrapper.
//!
//! # Failure Handling
//!
//! Nothing escapes [`SafeWs`] as an error. Every failure path resolves to a
//! state transition, an optional notification and, while retries remain, a
//! scheduled reconnect:
//!
//! | Failure | State | Retry |
//! |---------|-------|-------|
//! | Connector refuses to construct a transport | `error` | yes |
//! | Transport reports an error | `error` | yes |
//! | Transport closes | `closed` | yes |
//! | Transport send fails | `error` | yes |
//! | [`SafeWs::close`] | `closed` | cancelled |
//!
//! # Reconnect Timer
//!
//! At most one timer is outstanding. It holds a weak reference to the
//! wrapper and the epoch it was scheduled in; `close()`, a successful open
//! and every new schedule bump the epoch, so a timer whose deadline already
//! elapsed never reconnects after it was cancelled.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::mem;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, trace, warn};

use crate::identifiers::{ConnectionId, SubscriptionId};
use crate::transport::{
    Connector, ReadyState, Transport, TransportEvent, TransportEvents, TransportListener,
};

use super::backoff::Backoff;
use super::builder::SafeWsBuilder;
use super::events::{ConnectionEvent, EventBus, EventHandler, EventKind, Subscription};
use super::options::ConnectionOptions;
use super::state::ConnectionState;

// ============================================================================
// ConnectionStatus
// ============================================================================

/// Point-in-time snapshot of a connection, for polling widgets and logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    /// Connection identifier.
    pub id: ConnectionId,
    /// Endpoint address.
    pub url: String,
    /// Current state.
    pub state: ConnectionState,
    /// `true` iff a send would be forwarded right now.
    pub ready: bool,
    /// Failed attempts since the last successful open.
    pub retry_count: u32,
    /// Retry ceiling.
    pub max_retries: u32,
    /// Delay of the pending reconnect, if one is scheduled.
    #[serde(rename = "reconnectDelayMs", serialize_with = "optional_millis")]
    pub reconnect_delay: Option<Duration>,
    /// Most recent failure since the last successful open.
    pub last_error: Option<String>,
    /// Registered handlers across all event kinds.
    pub subscriber_count: usize,
}

fn optional_millis<S: serde::Serializer>(
    value: &Option<Duration>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(delay) => serializer.serialize_some(&(delay.as_millis() as u64)),
        None => serializer.serialize_none(),
    }
}

// ============================================================================
// Internal Types
// ============================================================================

/// Why the current transport went away.
enum Failure {
    Closed,
    Error(String),
}

/// The single outstanding reconnect timer.
struct PendingReconnect {
    epoch: u64,
    delay: Duration,
    handle: AbortHandle,
}

/// Mutable connection state, guarded by one lock.
#[derive(Default)]
struct Core {
    state: ConnectionState,
    retry_count: u32,
    transport: Option<Arc<dyn Transport>>,
    /// Bumped whenever the current transport is replaced or retired.
    generation: u64,
    reconnect: Option<PendingReconnect>,
    /// Bumped whenever the pending reconnect is cancelled.
    timer_epoch: u64,
    last_error: Option<String>,
    /// The current transport reported open before `connect` attached it.
    open_pending: bool,
}

impl Core {
    /// Applies a transition and queues the `statechange` event.
    fn set_state(&mut self, next: ConnectionState, out: &mut Vec<ConnectionEvent>) {
        if self.state == next {
            return;
        }

        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );

        trace!(from = %self.state, to = %next, "State transition");
        self.state = next;
        out.push(ConnectionEvent::StateChange(next));
    }

    /// Cancels the pending reconnect, if any, and invalidates its epoch.
    fn cancel_reconnect(&mut self) {
        self.timer_epoch += 1;
        if let Some(pending) = self.reconnect.take() {
            pending.handle.abort();
            trace!(delay_ms = pending.delay.as_millis() as u64, "Reconnect cancelled");
        }
    }

    /// Detaches the current transport and ignores its future events.
    fn retire_transport(&mut self) -> Option<Arc<dyn Transport>> {
        self.generation += 1;
        self.open_pending = false;
        self.transport.take()
    }

    /// Records a successful open and queues `statechange(open)` then `open`.
    fn mark_open(&mut self, out: &mut Vec<ConnectionEvent>) {
        self.retry_count = 0;
        self.last_error = None;
        self.open_pending = false;
        self.cancel_reconnect();

        self.set_state(ConnectionState::Open, out);
        out.push(ConnectionEvent::Open);
    }
}

// ============================================================================
// Inner
// ============================================================================

/// Shared state behind every [`SafeWs`] clone.
struct Inner {
    id: ConnectionId,
    url: String,
    options: ConnectionOptions,
    backoff: Backoff,
    connector: Arc<dyn Connector>,
    runtime: Handle,
    events: Arc<EventBus>,
    core: Mutex<Core>,
    /// Weak self-reference handed to transports and timers.
    this: Weak<Inner>,
}

impl Inner {
    fn emit_all(&self, events: Vec<ConnectionEvent>) {
        for event in &events {
            self.events.emit(event);
        }
    }

    fn connect(&self) {
        let (generation, out, replaced) = {
            let mut core = self.core.lock();

            if core.state.is_active() {
                debug!(id = %self.id, state = %core.state, "Connect ignored");
                return;
            }

            core.cancel_reconnect();
            let replaced = core.retire_transport();

            let mut out = Vec::new();
            core.set_state(ConnectionState::Connecting, &mut out);
            (core.generation, out, replaced)
        };
        drop(replaced);

        debug!(id = %self.id, url = %self.url, generation, "Connecting");
        self.emit_all(out);

        let listener: Weak<dyn TransportListener> = self.this.clone();
        let events = TransportEvents::new(listener, generation);

        let result = {
            let _guard = self.runtime.enter();
            self.connector.open(&self.url, events)
        };

        match result {
            Ok(transport) => {
                let transport: Arc<dyn Transport> = Arc::from(transport);
                let mut core = self.core.lock();

                if core.generation == generation {
                    core.transport = Some(transport);

                    // The handshake may already have finished on another
                    // worker; its open is applied only now that sends work.
                    if core.open_pending {
                        let mut out = Vec::new();
                        core.mark_open(&mut out);
                        drop(core);

                        info!(id = %self.id, url = %self.url, "Connection open");
                        self.emit_all(out);
                    }
                } else {
                    // Superseded while the connector ran (close() or a
                    // synchronous failure report).
                    drop(core);
                    trace!(id = %self.id, generation, "Discarding superseded transport");
                    if transport.ready_state() == ReadyState::Open {
                        transport.close();
                    }
                }
            }

            Err(e) => {
                warn!(id = %self.id, url = %self.url, error = %e, "Transport construction failed");
                self.fail(generation, Failure::Error(e.to_string()));
            }
        }
    }

    fn send_safe(&self, payload: &str) -> bool {
        let (transport, generation) = {
            let core = self.core.lock();
            if core.state != ConnectionState::Open {
                trace!(id = %self.id, state = %core.state, "Send dropped: not open");
                return false;
            }
            match &core.transport {
                Some(transport) => (Arc::clone(transport), core.generation),
                None => return false,
            }
        };

        let ready_state = transport.ready_state();
        if ready_state != ReadyState::Open {
            trace!(id = %self.id, ?ready_state, "Send dropped: transport not ready");
            return false;
        }

        match transport.send(payload) {
            Ok(()) => true,
            Err(e) => {
                warn!(id = %self.id, error = %e, "Send failed");
                self.fail(generation, Failure::Error(e.to_string()));
                false
            }
        }
    }

    fn close(&self) {
        let (out, retired) = {
            let mut core = self.core.lock();
            core.cancel_reconnect();
            let retired = core.retire_transport();

            let mut out = Vec::new();
            core.set_state(ConnectionState::Closed, &mut out);
            (out, retired)
        };

        if let Some(transport) = retired
            && transport.ready_state() == ReadyState::Open
        {
            transport.close();
        }

        if !out.is_empty() {
            info!(id = %self.id, url = %self.url, "Connection closed");
        }
        self.emit_all(out);
    }

    fn is_ready(&self) -> bool {
        let transport = {
            let core = self.core.lock();
            if core.state != ConnectionState::Open {
                return false;
            }
            core.transport.clone()
        };

        transport.is_some_and(|t| t.ready_state() == ReadyState::Open)
    }

    fn opened(&self, generation: u64) {
        let out = {
            let mut core = self.core.lock();
            if core.generation != generation || core.state != ConnectionState::Connecting {
                return;
            }

            if core.transport.is_none() {
                trace!(id = %self.id, generation, "Open reported before attach");
                core.open_pending = true;
                return;
            }

            let mut out = Vec::new();
            core.mark_open(&mut out);
            out
        };

        info!(id = %self.id, url = %self.url, "Connection open");
        self.emit_all(out);
    }

    fn message(&self, generation: u64, payload: String) {
        if self.core.lock().generation != generation {
            return;
        }
        self.events.emit(&ConnectionEvent::Message(payload));
    }

    /// Retires the current transport, records the failure and schedules a
    /// retry while the ceiling allows it.
    fn fail(&self, generation: u64, failure: Failure) {
        let (out, retired) = {
            let mut core = self.core.lock();
            if core.generation != generation {
                trace!(id = %self.id, generation, "Ignoring event from stale transport");
                return;
            }

            let retired = core.retire_transport();
            let mut out = Vec::new();

            let notification = match failure {
                Failure::Closed => {
                    core.set_state(ConnectionState::Closed, &mut out);
                    ConnectionEvent::Close
                }
                Failure::Error(reason) => {
                    core.last_error = Some(reason.clone());
                    core.set_state(ConnectionState::Error, &mut out);
                    ConnectionEvent::Error(reason)
                }
            };

            self.schedule_reconnect(&mut core);
            out.push(notification);
            (out, retired)
        };

        if let Some(transport) = retired
            && transport.ready_state() == ReadyState::Open
        {
            transport.close();
        }

        self.emit_all(out);
    }

    fn schedule_reconnect(&self, core: &mut Core) {
        if core.retry_count >= self.options.max_retries {
            warn!(
                id = %self.id,
                url = %self.url,
                retries = core.retry_count,
                state = %core.state,
                "Reconnect attempts exhausted"
            );
            return;
        }

        let delay = self.backoff.delay(core.retry_count);
        core.retry_count += 1;
        core.cancel_reconnect();

        // The deadline is fixed now, not when the task is first polled, and
        // read from the wrapper's own runtime clock.
        let deadline = {
            let _guard = self.runtime.enter();
            Instant::now() + delay
        };
        let epoch = core.timer_epoch;
        let this = self.this.clone();
        let task = self.runtime.spawn(async move {
            sleep_until(deadline).await;
            if let Some(inner) = this.upgrade() {
                inner.fire_reconnect(epoch);
            }
        });

        debug!(
            id = %self.id,
            retry = core.retry_count,
            delay_ms = delay.as_millis() as u64,
            "Reconnect scheduled"
        );

        core.reconnect = Some(PendingReconnect {
            epoch,
            delay,
            handle: task.abort_handle(),
        });
    }

    fn fire_reconnect(&self, epoch: u64) {
        {
            let mut core = self.core.lock();
            let current = core.reconnect.as_ref().map(|pending| pending.epoch);
            if core.timer_epoch != epoch || current != Some(epoch) {
                return;
            }
            core.reconnect = None;
        }

        debug!(id = %self.id, "Reconnect timer fired");
        self.connect();
    }
}

impl TransportListener for Inner {
    fn on_transport_event(&self, generation: u64, event: TransportEvent) {
        match event {
            TransportEvent::Opened => self.opened(generation),
            TransportEvent::Closed => self.fail(generation, Failure::Closed),
            TransportEvent::Failed(reason) => self.fail(generation, Failure::Error(reason)),
            TransportEvent::Message(payload) => self.message(generation, payload),
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let core = self.core.get_mut();
        core.cancel_reconnect();

        if let Some(transport) = mem::take(&mut core.transport)
            && transport.ready_state() == ReadyState::Open
        {
            transport.close();
        }
    }
}

// ============================================================================
// SafeWs
// ============================================================================

/// Resilient WebSocket connection.
///
/// Owns one logical connection to `url`: at most one transport and at most
/// one pending reconnect timer. Cheap to clone; clones share the same
/// connection. Dropping the last clone cancels the pending timer and tears
/// down the transport.
///
/// All methods are synchronous and never fail. Network I/O and delayed
/// reconnects run on the tokio runtime captured at construction.
///
/// # Example
///
/// ```no_run
/// use safe_ws::{ConnectionEvent, EventKind, SafeWs};
///
/// # async fn example() -> safe_ws::Result<()> {
/// let ws = SafeWs::builder("ws://localhost:8080/chat")
///     .max_retries(3)
///     .on_message(|text| println!("received {text}"))
///     .build()?;
///
/// ws.on(EventKind::StateChange, |event| {
///     if let ConnectionEvent::StateChange(state) = event {
///         println!("state: {state}");
///     }
/// });
///
/// ws.connect();
///
/// if !ws.send_safe(r#"{"type":"ping"}"#) {
///     // Not open yet; the payload was dropped.
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SafeWs {
    inner: Arc<Inner>,
}

// ============================================================================
// SafeWs - Constructors
// ============================================================================

impl SafeWs {
    /// Creates a builder for `url`.
    #[inline]
    #[must_use]
    pub fn builder(url: impl Into<String>) -> SafeWsBuilder {
        SafeWsBuilder::new(url)
    }

    /// Creates a connection with default options and the default connector.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoRuntime`](crate::Error::NoRuntime) outside a tokio runtime.
    pub fn new(url: impl Into<String>) -> crate::Result<Self> {
        Self::builder(url).build()
    }

    pub(crate) fn from_parts(
        url: String,
        options: ConnectionOptions,
        connector: Arc<dyn Connector>,
        runtime: Handle,
    ) -> Self {
        let backoff = options.backoff();
        let inner = Arc::new_cyclic(|this| Inner {
            id: ConnectionId::generate(),
            url,
            options,
            backoff,
            connector,
            runtime,
            events: Arc::new(EventBus::new()),
            core: Mutex::new(Core::default()),
            this: this.clone(),
        });

        debug!(id = %inner.id, url = %inner.url, "Connection created");
        Self { inner }
    }
}

// ============================================================================
// SafeWs - Public API
// ============================================================================

impl SafeWs {
    /// Starts a connection attempt.
    ///
    /// No-op while `connecting` or `open`. Cancels a pending reconnect.
    /// Does not reset the retry count; only a successful open does.
    pub fn connect(&self) {
        self.inner.connect();
    }

    /// Forwards `payload` iff the connection is ready.
    ///
    /// Returns `false` without side effects when not ready. Nothing is
    /// queued: a dropped payload is the caller's to retry. A send failure
    /// moves the connection to `error` and schedules a reconnect.
    #[must_use = "a false return means the payload was dropped"]
    pub fn send_safe(&self, payload: &str) -> bool {
        self.inner.send_safe(payload)
    }

    /// Closes the connection and cancels any pending reconnect.
    ///
    /// The transport's own close is invoked only if it reports `Open`.
    /// Idempotent. A later [`connect`](Self::connect) starts over.
    pub fn close(&self) {
        self.inner.close();
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.core.lock().state
    }

    /// Returns `true` iff the state is `open` and the transport agrees.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.inner.is_ready()
    }

    /// Registers a handler for `kind`.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(kind, Arc::new(handler))
    }

    /// Registers a handler and returns a guard that unsubscribes on drop.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        let id = self.on(kind, handler);
        Subscription::new(&self.inner.events, kind, id)
    }

    /// Removes a handler. Returns `false` if it was not registered for `kind`.
    pub fn off(&self, kind: EventKind, id: SubscriptionId) -> bool {
        self.inner.events.unsubscribe(kind, id)
    }

    /// Removes every handler.
    pub fn clear_subscribers(&self) {
        self.inner.events.clear();
    }

    pub(crate) fn register(&self, kind: EventKind, handler: EventHandler) -> SubscriptionId {
        self.inner.events.subscribe(kind, handler)
    }

    /// Returns the connection identifier.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// Returns the endpoint address.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Returns the options this connection was built with.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ConnectionOptions {
        &self.inner.options
    }

    /// Returns failed attempts since the last successful open.
    #[inline]
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.inner.core.lock().retry_count
    }

    /// Returns the most recent failure since the last successful open.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.inner.core.lock().last_error.clone()
    }

    /// Returns a snapshot of the connection.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        let (mut status, transport) = {
            let core = self.inner.core.lock();
            let transport = match core.state {
                ConnectionState::Open => core.transport.clone(),
                _ => None,
            };

            let status = ConnectionStatus {
                id: self.inner.id,
                url: self.inner.url.clone(),
                state: core.state,
                ready: false,
                retry_count: core.retry_count,
                max_retries: self.inner.options.max_retries,
                reconnect_delay: core.reconnect.as_ref().map(|pending| pending.delay),
                last_error: core.last_error.clone(),
                subscriber_count: 0,
            };
            (status, transport)
        };

        // The transport is queried outside the lock; `ready` reflects the
        // state captured above.
        status.ready = transport.is_some_and(|t| t.ready_state() == ReadyState::Open);
        status.subscriber_count = self.inner.events.total();
        status
    }
}

impl fmt::Debug for SafeWs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.inner.core.lock();
        f.debug_struct("SafeWs")
            .field("id", &self.inner.id)
            .field("url", &self.inner.url)
            .field("state", &core.state)
            .field("retry_count", &core.retry_count)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
