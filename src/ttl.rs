//! Per-entry expiration.
//!
//! Every policy stores an absolute deadline next to each value. The deadline
//! is `now + ttl`, set on `put` and pushed forward on every `put` and every
//! successful `get`. An entry whose deadline has passed is treated as absent:
//! `get` deletes it and reports a miss.

use std::time::{Duration, Instant};

/// Longest TTL accepted; larger values are clamped so `now + ttl` cannot overflow.
pub const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Time-to-live shared by every entry of one policy instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expiry {
    ttl: Duration,
}

impl Expiry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl: ttl.min(MAX_TTL),
        }
    }

    pub fn from_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Deadline for an entry written or read at `now`.
    #[inline]
    pub fn deadline(&self, now: Instant) -> Instant {
        now + self.ttl
    }
}

/// Returns `true` once `now` has reached `deadline`.
#[inline]
pub fn is_expired(deadline: Instant, now: Instant) -> bool {
    now >= deadline
}
