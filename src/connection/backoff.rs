//! Capped exponential backoff.
//!
//! The delay before retry `n` (zero-based) is
//! `min(max_delay, base_delay * 2^n)`. With the defaults this yields
//! `1s, 2s, 4s, 8s, 16s, 30s, 30s, ...`.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// Backoff
// ============================================================================

/// Reconnect delay policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Delay before the first retry.
    base: Duration,
    /// Upper bound for any delay.
    max: Duration,
}

impl Backoff {
    /// Creates a policy from a base and a cap.
    #[inline]
    #[must_use]
    pub const fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Returns the base delay.
    #[inline]
    #[must_use]
    pub const fn base(&self) -> Duration {
        self.base
    }

    /// Returns the delay cap.
    #[inline]
    #[must_use]
    pub const fn max(&self) -> Duration {
        self.max
    }

    /// Returns the delay to wait before retry number `retry` (zero-based).
    ///
    /// Saturates at the cap instead of overflowing for large `retry`.
    #[must_use]
    pub fn delay(&self, retry: u32) -> Duration {
        2u32.checked_pow(retry)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

// ============================================================================
// Tests
// ============================================================================
