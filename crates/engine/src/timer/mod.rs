//! Event-time timers
//!
//! A timer slot is identified by `(key, family, tag)` and holds at most one
//! pending fire timestamp. Setting a pending slot again replaces its
//! timestamp, so however many times an element handler re-arms a slot it
//! fires once per arm cycle. Every arm gets a fresh generation number, which
//! the [`FiringLedger`] uses to reject duplicate delivery.
//!
//! ```rust
//! use engine::timer::TimerRegistry;
//! use engine::watermark::Watermark;
//! use engine::window::Window;
//!
//! let mut registry = TimerRegistry::new();
//! let window = Window::global();
//! for _ in 0..15 {
//!     registry.set("key-1".to_string(), "Callback", "", window.max_timestamp(), window.clone());
//! }
//! assert_eq!(registry.len(), 1);
//!
//! let fired = registry.take_eligible(Watermark::max());
//! assert_eq!(fired.len(), 1);
//! assert!(registry.is_empty());
//! ```

mod descriptor;
mod ledger;
mod registry;

pub use descriptor::EventTimeTimer;
pub use ledger::FiringLedger;
pub use registry::{RegistryStats, TimerRegistry};

use crate::window::Window;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tag used when a family has a single timer per key
pub const DEFAULT_TAG: &str = "";

/// Identity of a timer: one pending timestamp at most per slot
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimerSlot<K> {
    pub key: K,
    pub family: String,
    pub tag: String,
}

impl<K> TimerSlot<K> {
    pub fn new(key: K, family: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            key,
            family: family.into(),
            tag: tag.into(),
        }
    }
}

impl<K: fmt::Display> fmt::Display for TimerSlot<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tag.is_empty() {
            write!(f, "{}:{}", self.key, self.family)
        } else {
            write!(f, "{}:{}/{}", self.key, self.family, self.tag)
        }
    }
}

/// A timer handed to `on_timer`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiredTimer {
    pub family: String,
    pub tag: String,
    /// Event time the timer was armed for
    pub timestamp: i64,
    /// Window the timer was armed in
    pub window: Window,
    /// Arm generation, unique across the registry
    pub generation: u64,
}

/// Where a timer slot is in its arm/fire cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerPhase {
    /// No pending timestamp
    Idle,
    /// Waiting for the watermark to reach the pending timestamp
    Armed,
    /// Callback currently running
    Firing,
}

/// Snapshot of one slot for diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyTimerStatus {
    pub family: String,
    pub tag: String,
    pub phase: TimerPhase,
    pub pending_timestamp: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_display() {
        assert_eq!(TimerSlot::new("k", "Callback", "").to_string(), "k:Callback");
        assert_eq!(TimerSlot::new(3, "Retry", "a").to_string(), "3:Retry/a");
    }

    #[test]
    fn test_slot_ordering() {
        let a = TimerSlot::new("a", "F", "");
        let b = TimerSlot::new("b", "F", "");
        assert!(a < b);
    }
}
