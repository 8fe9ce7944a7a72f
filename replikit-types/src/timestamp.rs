//! Hybrid Logical Clock timestamps for last-writer-wins ordering.
//!
//! Combines physical time with a logical counter to ensure:
//! - Monotonicity (a replica never stamps two writes with the same value)
//! - Causality (a write issued after observing `t` is stamped above `t`)
//! - Bounded drift from physical time

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, or 0 if the system clock is set before it.
fn wall_clock_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// A Hybrid Logical Clock timestamp.
///
/// Consists of:
/// - `wall_time`: Milliseconds since Unix epoch (physical component)
/// - `logical`: Logical counter for events at the same wall time
///
/// Ordered by `wall_time`, then `logical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HybridTimestamp {
    /// Physical time component (milliseconds since Unix epoch).
    wall_time: u64,
    /// Logical counter for ordering events at the same wall time.
    logical: u32,
}

impl HybridTimestamp {
    /// Creates a new timestamp at the current time.
    #[must_use]
    pub fn now() -> Self {
        Self {
            wall_time: wall_clock_ms(),
            logical: 0,
        }
    }

    /// Creates a timestamp from components.
    #[must_use]
    pub const fn new(wall_time: u64, logical: u32) -> Self {
        Self { wall_time, logical }
    }

    /// A timestamp that decreases as real time advances.
    ///
    /// Writes stamped this way let the earliest writer win.
    #[must_use]
    pub fn reversed_now() -> Self {
        Self {
            wall_time: u64::MAX - wall_clock_ms(),
            logical: 0,
        }
    }

    /// Returns the wall time component.
    #[must_use]
    pub const fn wall_time(&self) -> u64 {
        self.wall_time
    }

    /// Returns the logical counter.
    #[must_use]
    pub const fn logical(&self) -> u32 {
        self.logical
    }

    /// The smallest timestamp strictly greater than this one.
    #[must_use]
    pub fn successor(&self) -> Self {
        match self.logical.checked_add(1) {
            Some(logical) => Self {
                wall_time: self.wall_time,
                logical,
            },
            None => Self {
                wall_time: self.wall_time.saturating_add(1),
                logical: 0,
            },
        }
    }

    /// Generates the next timestamp, ensuring monotonicity.
    ///
    /// This should be called when creating a new local event.
    #[must_use]
    pub fn tick(&self) -> Self {
        let now = wall_clock_ms();
        if now > self.wall_time {
            Self {
                wall_time: now,
                logical: 0,
            }
        } else {
            self.successor()
        }
    }

    /// Returns true if this timestamp orders before the other.
    #[must_use]
    pub fn is_before(&self, other: &Self) -> bool {
        self < other
    }

    /// Returns true if this timestamp orders after the other.
    #[must_use]
    pub fn is_after(&self, other: &Self) -> bool {
        self > other
    }
}

impl Default for HybridTimestamp {
    fn default() -> Self {
        Self::now()
    }
}

impl PartialOrd for HybridTimestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HybridTimestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.wall_time.cmp(&other.wall_time) {
            Ordering::Equal => self.logical.cmp(&other.logical),
            other => other,
        }
    }
}
