//! Default connector over `tokio-tungstenite`.
//!
//! # Event Loop
//!
//! [`TungsteniteConnector::open`] validates the address synchronously and
//! spawns one tokio task per transport that:
//!
//! - Runs the handshake, bounded by the optional connect timeout
//! - Forwards incoming text frames as `message` events
//! - Writes payloads queued by [`TungsteniteTransport::send`]
//! - Reports `closed` or `failed` exactly once when it terminates
//!
//! Dropping the [`TungsteniteTransport`] closes its command channel, which
//! ends the task even mid-handshake.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, trace, warn};
use url::Url;

use crate::error::{Error, Result};

use super::{Connector, ReadyState, Transport, TransportEvents};

// ============================================================================
// Types
// ============================================================================

/// Client stream produced by the handshake.
type ClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Internal commands for the event loop.
enum TransportCommand {
    /// Write a text frame.
    Send(String),
    /// Close the connection.
    Shutdown,
}

// ============================================================================
// TungsteniteConnector
// ============================================================================

/// Connector producing [`TungsteniteTransport`]s.
///
/// Accepts `ws://` addresses. `wss://` addresses are accepted here but the
/// handshake fails unless `tokio-tungstenite` is built with a TLS feature.
#[derive(Debug, Clone, Default)]
pub struct TungsteniteConnector {
    /// Handshake timeout. `None` waits forever.
    connect_timeout: Option<Duration>,
}

impl TungsteniteConnector {
    /// Creates a connector without a handshake timeout.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            connect_timeout: None,
        }
    }

    /// Sets the handshake timeout.
    #[inline]
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Returns the handshake timeout.
    #[inline]
    #[must_use]
    pub const fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }

    /// Parses and checks an endpoint address.
    fn parse_url(url: &str) -> Result<Url> {
        let parsed = Url::parse(url).map_err(|e| Error::invalid_url(url, e))?;

        match parsed.scheme() {
            "ws" | "wss" => Ok(parsed),
            other => Err(Error::unsupported_scheme(other)),
        }
    }
}

impl Connector for TungsteniteConnector {
    fn open(&self, url: &str, events: TransportEvents) -> Result<Box<dyn Transport>> {
        let url = Self::parse_url(url)?;
        let runtime = Handle::try_current().map_err(|e| Error::no_runtime(e.to_string()))?;

        let ready = Arc::new(AtomicU8::new(ReadyState::Connecting.as_u8()));
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        debug!(%url, generation = events.generation(), "Spawning WebSocket transport");

        runtime.spawn(run_event_loop(
            url,
            self.connect_timeout,
            Arc::clone(&ready),
            events,
            command_rx,
        ));

        Ok(Box::new(TungsteniteTransport { ready, command_tx }))
    }
}

// ============================================================================
// TungsteniteTransport
// ============================================================================

/// Handle to a WebSocket driven by a background task.
pub struct TungsteniteTransport {
    /// Ready state (shared with event loop).
    ready: Arc<AtomicU8>,
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<TransportCommand>,
}

impl Transport for TungsteniteTransport {
    #[inline]
    fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.ready.load(Ordering::Acquire))
    }

    fn send(&self, payload: &str) -> Result<()> {
        let state = self.ready_state();
        if state != ReadyState::Open {
            return Err(Error::not_ready(state));
        }

        self.command_tx
            .send(TransportCommand::Send(payload.to_owned()))
            .map_err(|_| Error::ConnectionClosed)
    }

    fn close(&self) {
        let _ = self.ready.compare_exchange(
            ReadyState::Open.as_u8(),
            ReadyState::Closing.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        let _ = self.command_tx.send(TransportCommand::Shutdown);
    }
}

impl std::fmt::Debug for TungsteniteTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TungsteniteTransport")
            .field("ready_state", &self.ready_state())
            .finish()
    }
}

// ============================================================================
// Event Loop
// ============================================================================

/// Performs the handshake, bounded by `limit`.
async fn handshake(url: &Url, limit: Option<Duration>) -> Result<ClientStream> {
    let connect = connect_async(url.as_str());

    let (stream, response) = match limit {
        Some(limit) => timeout(limit, connect)
            .await
            .map_err(|_| Error::connection_timeout(limit.as_millis() as u64))??,
        None => connect.await?,
    };

    trace!(status = %response.status(), "Handshake response");
    Ok(stream)
}

/// Drives one WebSocket from handshake to termination.
async fn run_event_loop(
    url: Url,
    connect_timeout: Option<Duration>,
    ready: Arc<AtomicU8>,
    events: TransportEvents,
    mut command_rx: mpsc::UnboundedReceiver<TransportCommand>,
) {
    let set_ready = |state: ReadyState| ready.store(state.as_u8(), Ordering::Release);

    // Any command before the handshake completes (or the handle being
    // dropped) aborts the attempt.
    let stream = tokio::select! {
        result = handshake(&url, connect_timeout) => match result {
            Ok(stream) => stream,
            Err(e) => {
                debug!(%url, error = %e, "WebSocket handshake failed");
                set_ready(ReadyState::Closed);
                events.failed(e.to_string());
                return;
            }
        },

        _ = command_rx.recv() => {
            debug!(%url, "Handshake aborted");
            set_ready(ReadyState::Closed);
            return;
        }
    };

    set_ready(ReadyState::Open);
    debug!(%url, "WebSocket connection established");
    events.opened();

    let (mut ws_write, mut ws_read) = stream.split();

    loop {
        tokio::select! {
            // Incoming frames from the remote end
            message = ws_read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        events.message(text.as_str());
                    }

                    Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => events.message(text),
                        Err(_) => trace!(len = bytes.len(), "Dropping non-UTF-8 binary frame"),
                    },

                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "WebSocket closed by remote");
                        set_ready(ReadyState::Closing);
                        // Flushes the queued close reply.
                        let _ = ws_write.close().await;
                        break;
                    }

                    Some(Err(e)) => {
                        error!(error = %e, "WebSocket error");
                        set_ready(ReadyState::Closed);
                        events.failed(e.to_string());
                        return;
                    }

                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }

                    // Ping/Pong are answered by tungstenite
                    _ => {}
                }
            }

            // Commands from the wrapper
            command = command_rx.recv() => {
                match command {
                    Some(TransportCommand::Send(payload)) => {
                        if let Err(e) = ws_write.send(Message::Text(payload.into())).await {
                            warn!(error = %e, "Failed to send frame");
                            set_ready(ReadyState::Closed);
                            events.failed(e.to_string());
                            return;
                        }
                        trace!("Frame sent");
                    }

                    Some(TransportCommand::Shutdown) | None => {
                        debug!("Transport shutdown");
                        set_ready(ReadyState::Closing);
                        let _ = ws_write.close().await;
                        break;
                    }
                }
            }
        }
    }

    set_ready(ReadyState::Closed);
    events.closed();
    debug!(%url, "Event loop terminated");
}

// ============================================================================
// Tests
// ============================================================================
