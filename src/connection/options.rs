//! Reconnection and handshake options.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use safe_ws::ConnectionOptions;
//!
//! let options = ConnectionOptions::new()
//!     .with_max_retries(10)
//!     .with_base_delay(Duration::from_secs(2))
//!     .with_max_delay(Duration::from_secs(60));
//!
//! assert!(options.validate().is_ok());
//! ```
//!
//! Options also load from JSON, with delays in milliseconds and missing
//! fields falling back to defaults:
//!
//! ```
//! use safe_ws::ConnectionOptions;
//!
//! let options = ConnectionOptions::from_json(r#"{ "maxRetries": 3, "baseDelay": 500 }"#)?;
//! assert_eq!(options.max_retries, 3);
//! assert_eq!(options.max_delay.as_millis(), 30_000);
//! # Ok::<(), safe_ws::Error>(())
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::backoff::Backoff;

// ============================================================================
// Constants
// ============================================================================

/// Default number of automatic reconnect attempts.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default delay before the first reconnect attempt.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Default upper bound for the reconnect delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);

/// Default handshake timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// ConnectionOptions
// ============================================================================

/// Configuration accepted by a [`SafeWs`](crate::SafeWs) at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionOptions {
    /// Automatic reconnect attempts before giving up.
    pub max_retries: u32,

    /// Delay before the first reconnect attempt.
    #[serde(with = "millis")]
    pub base_delay: Duration,

    /// Upper bound for the reconnect delay.
    #[serde(with = "millis")]
    pub max_delay: Duration,

    /// Handshake timeout for the default connector. `None` waits forever.
    #[serde(with = "optional_millis")]
    pub connect_timeout: Option<Duration>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ConnectionOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
        }
    }

    /// Parses options from a JSON document.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the document is malformed
    /// - [`Error::Config`] if the parsed values fail [`validate`](Self::validate)
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ConnectionOptions {
    /// Sets the number of automatic reconnect attempts.
    #[inline]
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the delay before the first reconnect attempt.
    #[inline]
    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the upper bound for the reconnect delay.
    #[inline]
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the handshake timeout. `None` disables it.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ConnectionOptions {
    /// Checks the options for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the base delay is zero, the cap is
    /// below the base delay, or the connect timeout is zero.
    pub fn validate(&self) -> Result<()> {
        if self.base_delay.is_zero() {
            return Err(Error::config("base delay must be greater than zero"));
        }

        if self.max_delay < self.base_delay {
            return Err(Error::config(format!(
                "max delay ({}ms) must not be below base delay ({}ms)",
                self.max_delay.as_millis(),
                self.base_delay.as_millis()
            )));
        }

        if self.connect_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(Error::config(
                "connect timeout must be greater than zero; use None to disable it",
            ));
        }

        Ok(())
    }

    /// Returns the backoff policy described by these options.
    #[inline]
    #[must_use]
    pub const fn backoff(&self) -> Backoff {
        Backoff::new(self.base_delay, self.max_delay)
    }
}

// ============================================================================
// Serde Helpers
// ============================================================================

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod optional_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|value| value.map(Duration::from_millis))
    }
}

// ============================================================================
// Tests
// ============================================================================
