//! Window types and bounds
//!
//! A window is the event-time interval an element belongs to. Its maximum
//! timestamp is the natural fire time for event-time timers armed while
//! processing the element.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of the window spanning all of event time
pub const GLOBAL_WINDOW_ID: &str = "global";

/// Represents the time bounds of a window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowBounds {
    /// Start time of the window (inclusive)
    pub start: DateTime<Utc>,
    /// End time of the window (exclusive)
    pub end: DateTime<Utc>,
}

impl WindowBounds {
    /// Create a new window bounds
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        assert!(start < end, "Window start must be before end");
        Self { start, end }
    }

    /// Get the duration of the window
    pub fn duration(&self) -> Duration {
        self.end.signed_duration_since(self.start)
    }

    /// Check if a timestamp (milliseconds) falls within this window
    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start.timestamp_millis() && timestamp < self.end.timestamp_millis()
    }

    /// Last millisecond that still belongs to the window
    pub fn max_timestamp(&self) -> i64 {
        self.end.timestamp_millis() - 1
    }
}

impl fmt::Display for WindowBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} - {})",
            self.start.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.end.format("%Y-%m-%d %H:%M:%S%.3f")
        )
    }
}

/// A window in event time
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Window {
    /// The time bounds of this window
    pub bounds: WindowBounds,
    /// Window identifier for tracking
    pub id: String,
}

impl Window {
    /// Create a new window with the given bounds
    pub fn new(bounds: WindowBounds) -> Self {
        let id = format!(
            "{}_{}",
            bounds.start.timestamp_millis(),
            bounds.end.timestamp_millis()
        );
        Self { bounds, id }
    }

    /// Create a window from millisecond bounds, `None` if out of range or empty
    pub fn from_millis(start: i64, end: i64) -> Option<Self> {
        let start = DateTime::<Utc>::from_timestamp_millis(start)?;
        let end = DateTime::<Utc>::from_timestamp_millis(end)?;
        if start >= end {
            return None;
        }
        Some(Window::new(WindowBounds::new(start, end)))
    }

    /// The single window spanning all of event time
    ///
    /// Its end sits one day before the representable maximum so the
    /// end-of-input watermark is strictly past its max timestamp.
    pub fn global() -> Self {
        let bounds = WindowBounds::new(
            DateTime::<Utc>::MIN_UTC,
            DateTime::<Utc>::MAX_UTC - Duration::days(1),
        );
        Self {
            bounds,
            id: GLOBAL_WINDOW_ID.to_string(),
        }
    }

    pub fn is_global(&self) -> bool {
        self.id == GLOBAL_WINDOW_ID
    }

    /// Check if a timestamp (milliseconds) falls within this window
    pub fn contains(&self, timestamp: i64) -> bool {
        self.bounds.contains(timestamp)
    }

    /// First millisecond of the window
    pub fn start_timestamp(&self) -> i64 {
        self.bounds.start.timestamp_millis()
    }

    /// Last millisecond of the window, the default event-time timer target
    pub fn max_timestamp(&self) -> i64 {
        self.bounds.max_timestamp()
    }

    /// Get the duration of the window
    pub fn duration(&self) -> Duration {
        self.bounds.duration()
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_global() {
            write!(f, "GlobalWindow")
        } else {
            write!(f, "Window[{}]", self.bounds)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn create_timestamp(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(millis).unwrap()
    }

    #[test]
    fn test_window_bounds_creation() {
        let bounds = WindowBounds::new(create_timestamp(1000), create_timestamp(2000));

        assert_eq!(bounds.duration(), Duration::milliseconds(1000));
        assert_eq!(bounds.max_timestamp(), 1999);
    }

    #[test]
    #[should_panic(expected = "Window start must be before end")]
    fn test_window_bounds_invalid() {
        WindowBounds::new(create_timestamp(2000), create_timestamp(1000));
    }

    #[test]
    fn test_window_bounds_contains() {
        let bounds = WindowBounds::new(create_timestamp(1000), create_timestamp(2000));

        assert!(!bounds.contains(999));
        assert!(bounds.contains(1000));
        assert!(bounds.contains(1999));
        assert!(!bounds.contains(2000));
    }

    #[test]
    fn test_window_from_millis() {
        let window = Window::from_millis(0, 10_000).unwrap();
        assert_eq!(window.id, "0_10000");
        assert_eq!(window.start_timestamp(), 0);
        assert_eq!(window.max_timestamp(), 9_999);

        assert!(Window::from_millis(10, 10).is_none());
    }

    #[test]
    fn test_global_window() {
        let global = Window::global();
        assert!(global.is_global());
        assert!(global.contains(0));
        assert!(global.contains(-1_000_000));
        assert!(global.max_timestamp() < i64::MAX);
        assert_eq!(global, Window::global());
        assert_eq!(global.to_string(), "GlobalWindow");
    }
}
