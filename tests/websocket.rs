//! End-to-end tests against a local WebSocket server.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use safe_ws::{
    ConnectionEvent, ConnectionState, Connector, EventKind, SafeWs, Transport, TransportEvents,
};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Helpers
// ============================================================================

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// How the server treats each accepted connection.
#[derive(Clone, Copy)]
enum Behavior {
    Echo,
    CloseFirst,
}

/// Binds a server on a random port; returns its URL and an accept counter.
async fn spawn_server(behavior: Behavior) -> Result<(String, Arc<AtomicUsize>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let url = format!("ws://{}", listener.local_addr()?);
    let accepted = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&accepted);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let index = counter.fetch_add(1, Ordering::SeqCst);

            tokio::spawn(async move {
                let Ok(mut ws) = accept_async(stream).await else {
                    return;
                };

                if matches!(behavior, Behavior::CloseFirst) && index == 0 {
                    let _ = ws.close(None).await;
                    return;
                }

                while let Some(Ok(message)) = ws.next().await {
                    if message.is_text() && ws.send(message).await.is_err() {
                        break;
                    }
                }
            });
        }
    });

    Ok((url, accepted))
}

/// Polls `condition` every 10ms until it holds or `limit` elapses.
async fn wait_until(limit: Duration, condition: impl Fn() -> bool) -> bool {
    timeout(limit, async {
        while !condition() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}

/// Returns a port nothing listens on.
async fn unused_port() -> Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    Ok(listener.local_addr()?.port())
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_open_send_and_receive() -> Result<()> {
    init_tracing();
    let (url, _) = spawn_server(Behavior::Echo).await?;

    let (message_tx, mut message_rx) = mpsc::unbounded_channel();
    let ws = SafeWs::builder(url)
        .on_message(move |text| {
            let _ = message_tx.send(text.to_owned());
        })
        .build()?;

    ws.connect();
    assert!(wait_until(Duration::from_secs(5), || ws.is_ready()).await);
    assert_eq!(ws.state(), ConnectionState::Open);

    assert!(ws.send_safe("ping"));
    let echoed = timeout(Duration::from_secs(5), message_rx.recv()).await?;
    assert_eq!(echoed.as_deref(), Some("ping"));

    ws.close();
    assert_eq!(ws.state(), ConnectionState::Closed);
    assert!(!ws.send_safe("after close"));
    Ok(())
}

#[tokio::test]
async fn test_reconnects_after_server_close() -> Result<()> {
    init_tracing();
    let (url, accepted) = spawn_server(Behavior::CloseFirst).await?;

    let opens = Arc::new(AtomicUsize::new(0));
    let opens_clone = Arc::clone(&opens);

    let ws = SafeWs::builder(url)
        .base_delay(Duration::from_millis(50))
        .max_delay(Duration::from_millis(200))
        .build()?;
    ws.on(EventKind::Open, move |_| {
        opens_clone.fetch_add(1, Ordering::SeqCst);
    });

    ws.connect();

    assert!(wait_until(Duration::from_secs(5), || opens.load(Ordering::SeqCst) == 2).await);
    assert!(wait_until(Duration::from_secs(5), || ws.is_ready()).await);
    assert_eq!(accepted.load(Ordering::SeqCst), 2);
    assert_eq!(ws.retry_count(), 0);

    ws.close();
    Ok(())
}

#[tokio::test]
async fn test_unreachable_endpoint_exhausts_retries() -> Result<()> {
    init_tracing();
    let port = unused_port().await?;

    let (error_tx, mut error_rx) = mpsc::unbounded_channel();
    let ws = SafeWs::builder(format!("ws://127.0.0.1:{port}"))
        .max_retries(2)
        .base_delay(Duration::from_millis(20))
        .max_delay(Duration::from_millis(40))
        .on_error(move |reason| {
            let _ = error_tx.send(reason.to_owned());
        })
        .build()?;

    ws.connect();

    for _ in 0..3 {
        let reason = timeout(Duration::from_secs(5), error_rx.recv()).await?;
        assert!(reason.is_some());
    }

    assert!(wait_until(Duration::from_secs(1), || ws.status().reconnect_delay.is_none()).await);
    assert_eq!(ws.state(), ConnectionState::Error);
    assert_eq!(ws.retry_count(), 2);
    assert!(ws.last_error().is_some());

    // Nothing further is scheduled.
    sleep(Duration::from_millis(200)).await;
    assert!(error_rx.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn test_malformed_url_is_a_construction_failure() -> Result<()> {
    init_tracing();
    let ws = SafeWs::builder("not a url").max_retries(0).build()?;

    ws.connect();

    assert_eq!(ws.state(), ConnectionState::Error);
    assert!(
        ws.last_error()
            .is_some_and(|reason| reason.starts_with("Invalid URL"))
    );
    assert!(!ws.is_ready());
    Ok(())
}

#[tokio::test]
async fn test_unsupported_scheme_is_a_construction_failure() -> Result<()> {
    let ws = SafeWs::builder("http://localhost:8080")
        .max_retries(0)
        .build()?;

    ws.connect();

    assert_eq!(ws.state(), ConnectionState::Error);
    assert!(
        ws.last_error()
            .is_some_and(|reason| reason.contains("Unsupported scheme"))
    );
    Ok(())
}

#[tokio::test]
async fn test_stalled_handshake_times_out_and_retries() -> Result<()> {
    init_tracing();

    // Accepts TCP connections and never answers the upgrade request.
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let url = format!("ws://{}", listener.local_addr()?);
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            held.push(stream);
        }
    });

    let (error_tx, mut error_rx) = mpsc::unbounded_channel();
    let ws = SafeWs::builder(url)
        .max_retries(1)
        .base_delay(Duration::from_millis(50))
        .max_delay(Duration::from_millis(50))
        .connect_timeout(Some(Duration::from_millis(100)))
        .on_error(move |reason| {
            let _ = error_tx.send(reason.to_owned());
        })
        .build()?;

    ws.connect();

    let first = timeout(Duration::from_secs(5), error_rx.recv()).await?;
    assert_eq!(first.as_deref(), Some("Connection timeout after 100ms"));
    assert_eq!(ws.state(), ConnectionState::Error);
    assert_eq!(ws.status().reconnect_delay, Some(Duration::from_millis(50)));

    let second = timeout(Duration::from_secs(5), error_rx.recv()).await?;
    assert_eq!(second.as_deref(), Some("Connection timeout after 100ms"));
    assert_eq!(accepted.load(Ordering::SeqCst), 2);
    assert_eq!(ws.retry_count(), 1);
    assert!(!ws.is_ready());
    Ok(())
}

#[tokio::test]
async fn test_binary_frames_delivered_only_when_utf8() -> Result<()> {
    init_tracing();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let url = format!("ws://{}", listener.local_addr()?);
    tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let Ok(mut ws) = accept_async(stream).await else {
            return;
        };

        let _ = ws.send(Message::binary(b"hello".to_vec())).await;
        let _ = ws.send(Message::binary(vec![0xff, 0xfe, 0xfd])).await;
        let _ = ws.send(Message::text("done")).await;
        while let Some(Ok(_)) = ws.next().await {}
    });

    let (message_tx, mut message_rx) = mpsc::unbounded_channel();
    let ws = SafeWs::builder(url)
        .on_message(move |text| {
            let _ = message_tx.send(text.to_owned());
        })
        .build()?;

    ws.connect();

    let mut received = Vec::new();
    while received.last().map(String::as_str) != Some("done") {
        match timeout(Duration::from_secs(5), message_rx.recv()).await? {
            Some(text) => received.push(text),
            None => break,
        }
    }

    assert_eq!(received, vec!["hello".to_owned(), "done".to_owned()]);
    ws.close();
    Ok(())
}

#[tokio::test]
async fn test_remote_close_is_answered() -> Result<()> {
    init_tracing();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let url = format!("ws://{}", listener.local_addr()?);
    let answered = Arc::new(AtomicBool::new(false));
    let answered_clone = Arc::clone(&answered);
    tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let Ok(mut ws) = accept_async(stream).await else {
            return;
        };

        let _ = ws.close(None).await;
        while let Some(Ok(message)) = ws.next().await {
            if message.is_close() {
                answered_clone.store(true, Ordering::SeqCst);
            }
        }
    });

    let ws = SafeWs::builder(url).max_retries(0).build()?;
    ws.connect();

    assert!(wait_until(Duration::from_secs(5), || ws.state() == ConnectionState::Closed).await);
    assert!(wait_until(Duration::from_secs(5), || answered.load(Ordering::SeqCst)).await);
    Ok(())
}

// ============================================================================
// Custom Connector
// ============================================================================

/// Connector whose transports open immediately and echo every send.
#[derive(Default)]
struct LoopbackConnector {
    constructed: Arc<AtomicUsize>,
}

struct LoopbackTransport {
    events: TransportEvents,
}

impl Transport for LoopbackTransport {
    fn ready_state(&self) -> safe_ws::ReadyState {
        safe_ws::ReadyState::Open
    }

    fn send(&self, payload: &str) -> safe_ws::Result<()> {
        self.events.message(payload);
        Ok(())
    }

    fn close(&self) {}
}

impl Connector for LoopbackConnector {
    fn open(&self, _url: &str, events: TransportEvents) -> safe_ws::Result<Box<dyn Transport>> {
        self.constructed.fetch_add(1, Ordering::SeqCst);

        let opener = events.clone();
        tokio::spawn(async move { opener.opened() });

        Ok(Box::new(LoopbackTransport { events }))
    }
}

#[tokio::test]
async fn test_custom_connector() -> Result<()> {
    let connector = LoopbackConnector::default();
    let constructed = Arc::clone(&connector.constructed);

    let received = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let received_clone = Arc::clone(&received);

    let ws = SafeWs::builder("loopback://")
        .connector(connector)
        .build()?;
    let _subscription = ws.subscribe(EventKind::Message, move |event| {
        if let ConnectionEvent::Message(text) = event {
            received_clone.lock().push(text.clone());
        }
    });

    ws.connect();
    ws.connect();
    assert!(wait_until(Duration::from_secs(5), || ws.is_ready()).await);

    assert!(ws.send_safe(r#"{"type":"test","payload":"data"}"#));
    assert_eq!(
        *received.lock(),
        vec![r#"{"type":"test","payload":"data"}"#.to_owned()]
    );
    assert_eq!(constructed.load(Ordering::SeqCst), 1);

    ws.close();
    Ok(())
}
