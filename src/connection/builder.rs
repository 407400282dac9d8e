//! Builder pattern for connection configuration.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use safe_ws::SafeWs;
//!
//! # fn example() -> safe_ws::Result<()> {
//! let ws = SafeWs::builder("wss://chat.example.com/socket")
//!     .max_retries(10)
//!     .base_delay(Duration::from_secs(2))
//!     .max_delay(Duration::from_secs(60))
//!     .on_open(|| println!("connected"))
//!     .on_error(|reason| eprintln!("connection error: {reason}"))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;

use crate::error::{Error, Result};
use crate::transport::{Connector, TungsteniteConnector};

use super::core::SafeWs;
use super::events::{ConnectionEvent, EventHandler, EventKind};
use super::options::ConnectionOptions;
use super::state::ConnectionState;

// ============================================================================
// SafeWsBuilder
// ============================================================================

/// Builder for a [`SafeWs`].
///
/// Use [`SafeWs::builder()`] to create a new builder.
#[derive(Clone)]
pub struct SafeWsBuilder {
    /// Endpoint address, opaque to the wrapper.
    url: String,
    /// Reconnection and handshake options.
    options: ConnectionOptions,
    /// Transport factory. Defaults to [`TungsteniteConnector`].
    connector: Option<Arc<dyn Connector>>,
    /// Runtime for timers and transport tasks. Defaults to the current one.
    runtime: Option<Handle>,
    /// Hooks registered as subscribers at build time.
    hooks: Vec<(EventKind, EventHandler)>,
}

// ============================================================================
// SafeWsBuilder Implementation
// ============================================================================

impl SafeWsBuilder {
    /// Creates a builder for `url` with default options.
    #[inline]
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            options: ConnectionOptions::new(),
            connector: None,
            runtime: None,
            hooks: Vec::new(),
        }
    }

    /// Replaces all options.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ConnectionOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the number of automatic reconnect attempts.
    #[inline]
    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.options.max_retries = max_retries;
        self
    }

    /// Sets the delay before the first reconnect attempt.
    #[inline]
    #[must_use]
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.options.base_delay = delay;
        self
    }

    /// Sets the upper bound for the reconnect delay.
    #[inline]
    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.options.max_delay = delay;
        self
    }

    /// Sets the handshake timeout of the default connector.
    #[inline]
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.options.connect_timeout = timeout;
        self
    }

    /// Uses a custom transport factory.
    #[inline]
    #[must_use]
    pub fn connector(mut self, connector: impl Connector) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Uses an explicit runtime instead of the current one.
    #[inline]
    #[must_use]
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Called after the connection opens.
    #[must_use]
    pub fn on_open<F>(self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.hook(EventKind::Open, move |_| hook())
    }

    /// Called after the remote end closes the connection.
    #[must_use]
    pub fn on_close<F>(self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.hook(EventKind::Close, move |_| hook())
    }

    /// Called with the failure description on every error.
    #[must_use]
    pub fn on_error<F>(self, hook: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.hook(EventKind::Error, move |event| {
            if let ConnectionEvent::Error(reason) = event {
                hook(reason);
            }
        })
    }

    /// Called with every incoming text payload.
    #[must_use]
    pub fn on_message<F>(self, hook: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.hook(EventKind::Message, move |event| {
            if let ConnectionEvent::Message(payload) = event {
                hook(payload);
            }
        })
    }

    /// Called with the new state on every transition.
    #[must_use]
    pub fn on_state_change<F>(self, hook: F) -> Self
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        self.hook(EventKind::StateChange, move |event| {
            if let ConnectionEvent::StateChange(state) = event {
                hook(*state);
            }
        })
    }

    fn hook<F>(mut self, kind: EventKind, handler: F) -> Self
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        self.hooks.push((kind, Arc::new(handler)));
        self
    }

    /// Builds the connection with validation.
    ///
    /// The connection starts `idle`; call [`SafeWs::connect`] to open it.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the options are inconsistent
    /// - [`Error::NoRuntime`] if no runtime was given and none is current
    pub fn build(self) -> Result<SafeWs> {
        self.options.validate()?;
        let runtime = self.resolve_runtime()?;

        let connector: Arc<dyn Connector> = match self.connector {
            Some(connector) => connector,
            None => Arc::new(
                TungsteniteConnector::new().with_connect_timeout(self.options.connect_timeout),
            ),
        };

        let ws = SafeWs::from_parts(self.url, self.options, connector, runtime);
        for (kind, handler) in self.hooks {
            ws.register(kind, handler);
        }

        Ok(ws)
    }
}

// ============================================================================
// Validation
// ============================================================================

impl SafeWsBuilder {
    /// Resolves the runtime used for timers and transport tasks.
    fn resolve_runtime(&self) -> Result<Handle> {
        match &self.runtime {
            Some(handle) => Ok(handle.clone()),
            None => Handle::try_current().map_err(|e| {
                Error::no_runtime(format!(
                    "{e}. Build inside a tokio runtime or pass one with .runtime()"
                ))
            }),
        }
    }
}

impl fmt::Debug for SafeWsBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SafeWsBuilder")
            .field("url", &self.url)
            .field("options", &self.options)
            .field("custom_connector", &self.connector.is_some())
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
