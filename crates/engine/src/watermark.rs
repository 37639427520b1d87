//! Watermark tracking for event-time timers
//!
//! A watermark is a promise from the source that no element with an earlier
//! timestamp will arrive. The engine fires an event-time timer once the
//! watermark reaches or passes the timer's timestamp.
//!
//! The watermark starts at `-∞` ([`Watermark::min`]), only moves forward, and
//! reaches `+∞` ([`Watermark::max`]) when a source is exhausted.
//!
//! # Example
//!
//! ```rust
//! use engine::watermark::{Watermark, WatermarkTracker};
//!
//! let mut tracker = WatermarkTracker::new(false);
//! assert!(tracker.current().is_min());
//!
//! assert_eq!(tracker.advance(Watermark::new(1_000)).unwrap(), Some(Watermark::new(1_000)));
//! // Regressions are ignored in lenient mode
//! assert_eq!(tracker.advance(Watermark::new(500)).unwrap(), None);
//! assert_eq!(tracker.lateness(400), 600);
//! ```

use crate::error::{WatermarkError, WatermarkResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Represents a watermark timestamp
///
/// All elements with timestamps below the watermark have been observed, so
/// timers at or before it may fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Watermark {
    /// The watermark timestamp in milliseconds since epoch
    pub timestamp: i64,
}

impl Watermark {
    /// Creates a new watermark with the given timestamp
    pub fn new(timestamp: i64) -> Self {
        Self { timestamp }
    }

    /// Returns the minimum possible watermark (beginning of time)
    pub fn min() -> Self {
        Self { timestamp: i64::MIN }
    }

    /// Returns the maximum possible watermark (end of input)
    pub fn max() -> Self {
        Self { timestamp: i64::MAX }
    }

    /// Whether a timer armed at `timestamp` is eligible to fire
    pub fn has_passed(&self, timestamp: i64) -> bool {
        timestamp <= self.timestamp
    }

    /// Returns true if this is the minimum watermark
    pub fn is_min(&self) -> bool {
        self.timestamp == i64::MIN
    }

    /// Returns true if this is the maximum watermark
    pub fn is_max(&self) -> bool {
        self.timestamp == i64::MAX
    }
}

impl Default for Watermark {
    fn default() -> Self {
        Self::min()
    }
}

impl std::fmt::Display for Watermark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_min() {
            write!(f, "Watermark(-inf)")
        } else if self.is_max() {
            write!(f, "Watermark(+inf)")
        } else {
            match DateTime::<Utc>::from_timestamp_millis(self.timestamp) {
                Some(dt) => write!(f, "Watermark({})", dt),
                None => write!(f, "Watermark({}ms)", self.timestamp),
            }
        }
    }
}

/// Monotonic watermark cursor
///
/// In strict mode a regression is an error; otherwise it is logged and
/// ignored.
#[derive(Debug, Clone)]
pub struct WatermarkTracker {
    current: Watermark,
    strict: bool,
    advances: u64,
    regressions: u64,
}

impl WatermarkTracker {
    pub fn new(strict: bool) -> Self {
        Self {
            current: Watermark::min(),
            strict,
            advances: 0,
            regressions: 0,
        }
    }

    /// Current watermark
    pub fn current(&self) -> Watermark {
        self.current
    }

    /// Move the watermark forward
    ///
    /// Returns the new watermark when it advanced, `None` when `candidate`
    /// does not move it.
    pub fn advance(&mut self, candidate: Watermark) -> WatermarkResult<Option<Watermark>> {
        if candidate > self.current {
            debug!(from = %self.current, to = %candidate, "Advanced watermark");
            self.current = candidate;
            self.advances += 1;
            return Ok(Some(candidate));
        }

        if candidate < self.current {
            self.regressions += 1;
            if self.strict {
                return Err(WatermarkError::WatermarkRegression {
                    current_watermark: self.current.timestamp,
                    new_watermark: candidate.timestamp,
                });
            }
            warn!(
                current = %self.current,
                candidate = %candidate,
                "Ignoring watermark regression"
            );
        }

        Ok(None)
    }

    /// How far `timestamp` is behind the watermark, 0 if it is not
    pub fn lateness(&self, timestamp: i64) -> i64 {
        if self.current.is_min() || timestamp >= self.current.timestamp {
            0
        } else {
            self.current.timestamp.saturating_sub(timestamp)
        }
    }

    /// Number of times the watermark moved forward
    pub fn advances(&self) -> u64 {
        self.advances
    }

    /// Number of ignored or rejected regressions
    pub fn regressions(&self) -> u64 {
        self.regressions
    }

    /// Resets the tracker to `-∞`
    pub fn reset(&mut self) {
        self.current = Watermark::min();
        self.advances = 0;
        self.regressions = 0;
    }
}

impl Default for WatermarkTracker {
    fn default() -> Self {
        Self::new(false)
    }
}
