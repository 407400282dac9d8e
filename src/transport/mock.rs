//! Scripted connector for unit tests.
//!
//! Every transport the wrapper opens is recorded; tests drive it by hand
//! (`open`, `close_remote`, `fail`, `message`) the way a browser event loop
//! would fire `onopen`/`onclose`/`onerror`/`onmessage`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::error::{Error, Result};

use super::{Connector, ReadyState, Transport, TransportEvents};

// ============================================================================
// MockConnector
// ============================================================================

#[derive(Clone, Default)]
pub(crate) struct MockConnector {
    shared: Arc<ConnectorShared>,
}

#[derive(Default)]
struct ConnectorShared {
    attempts: AtomicUsize,
    fail_construction: AtomicBool,
    open_during_construction: AtomicBool,
    opened: Mutex<Vec<Arc<MockSocket>>>,
    urls: Mutex<Vec<String>>,
}

impl MockConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Makes every following `open` call fail synchronously.
    pub(crate) fn fail_construction(&self, fail: bool) {
        self.shared.fail_construction.store(fail, Ordering::SeqCst);
    }

    /// Makes every following transport report open from inside `open`,
    /// before the wrapper has attached it.
    pub(crate) fn open_during_construction(&self, enabled: bool) {
        self.shared
            .open_during_construction
            .store(enabled, Ordering::SeqCst);
    }

    /// Number of `open` calls, failed or not.
    pub(crate) fn attempts(&self) -> usize {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    /// Number of transports actually constructed.
    pub(crate) fn constructed(&self) -> usize {
        self.shared.opened.lock().len()
    }

    pub(crate) fn urls(&self) -> Vec<String> {
        self.shared.urls.lock().clone()
    }

    /// The most recently constructed transport.
    pub(crate) fn last(&self) -> Arc<MockSocket> {
        self.shared
            .opened
            .lock()
            .last()
            .cloned()
            .expect("no transport constructed yet")
    }

    pub(crate) fn nth(&self, index: usize) -> Arc<MockSocket> {
        Arc::clone(&self.shared.opened.lock()[index])
    }
}

impl Connector for MockConnector {
    fn open(&self, url: &str, events: TransportEvents) -> Result<Box<dyn Transport>> {
        self.shared.attempts.fetch_add(1, Ordering::SeqCst);
        self.shared.urls.lock().push(url.to_owned());

        if self.shared.fail_construction.load(Ordering::SeqCst) {
            return Err(Error::connection("construction refused"));
        }

        let socket = Arc::new(MockSocket {
            events,
            ready: Mutex::new(ReadyState::Connecting),
            sent: Mutex::new(Vec::new()),
            close_calls: AtomicUsize::new(0),
            fail_sends: AtomicBool::new(false),
        });
        self.shared.opened.lock().push(Arc::clone(&socket));

        if self.shared.open_during_construction.load(Ordering::SeqCst) {
            socket.open();
        }

        Ok(Box::new(MockTransport { socket }))
    }
}

// ============================================================================
// MockSocket
// ============================================================================

pub(crate) struct MockSocket {
    events: TransportEvents,
    ready: Mutex<ReadyState>,
    sent: Mutex<Vec<String>>,
    close_calls: AtomicUsize,
    fail_sends: AtomicBool,
}

impl MockSocket {
    /// Simulates a completed handshake.
    pub(crate) fn open(&self) {
        *self.ready.lock() = ReadyState::Open;
        self.events.opened();
    }

    /// Simulates the remote end closing.
    pub(crate) fn close_remote(&self) {
        *self.ready.lock() = ReadyState::Closed;
        self.events.closed();
    }

    /// Simulates an error event.
    pub(crate) fn fail(&self, reason: &str) {
        self.events.failed(reason);
    }

    pub(crate) fn message(&self, payload: &str) {
        self.events.message(payload);
    }

    /// Overrides the readiness flag without firing an event.
    pub(crate) fn set_ready(&self, state: ReadyState) {
        *self.ready.lock() = state;
    }

    pub(crate) fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    pub(crate) fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    pub(crate) fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

// ============================================================================
// MockTransport
// ============================================================================

struct MockTransport {
    socket: Arc<MockSocket>,
}

impl Transport for MockTransport {
    fn ready_state(&self) -> ReadyState {
        *self.socket.ready.lock()
    }

    fn send(&self, payload: &str) -> Result<()> {
        if self.socket.fail_sends.load(Ordering::SeqCst) {
            return Err(Error::connection("send failed"));
        }
        self.socket.sent.lock().push(payload.to_owned());
        Ok(())
    }

    fn close(&self) {
        self.socket.close_calls.fetch_add(1, Ordering::SeqCst);
        *self.socket.ready.lock() = ReadyState::Closing;
    }
}
