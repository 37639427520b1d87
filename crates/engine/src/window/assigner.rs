//! Window assigners
//!
//! Decide which window an element belongs to when the source did not
//! already place it in one.

use super::types::Window;
use crate::config::{WindowConfig, WindowType};
use chrono::Duration;
use std::fmt;
use std::sync::Arc;

/// Trait for assigning elements to windows
pub trait WindowAssigner: Send + Sync + fmt::Debug {
    /// Assign a timestamp (milliseconds) to one or more windows
    fn assign_windows(&self, timestamp: i64) -> Vec<Window>;
}

/// Build the assigner described by `config`
pub fn assigner_for(config: &WindowConfig) -> Arc<dyn WindowAssigner> {
    match (config.window_type, config.size_ms) {
        (WindowType::Tumbling, Some(size_ms)) if size_ms > 0 => Arc::new(
            TumblingWindowAssigner::new(Duration::milliseconds(size_ms as i64)),
        ),
        _ => Arc::new(GlobalWindowAssigner),
    }
}

/// Puts every element in the global window
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalWindowAssigner;

impl WindowAssigner for GlobalWindowAssigner {
    fn assign_windows(&self, _timestamp: i64) -> Vec<Window> {
        vec![Window::global()]
    }
}

/// Tumbling window assigner
///
/// Creates fixed-size, non-overlapping windows. Each element is assigned to
/// exactly one window based on its timestamp.
///
/// # Example
/// ```text
/// Window size: 5 seconds
/// Element at timestamp 7 -> Window [5, 10)
/// Element at timestamp 12 -> Window [10, 15)
/// ```
#[derive(Debug, Clone)]
pub struct TumblingWindowAssigner {
    /// Size of each window
    size: Duration,
    /// Optional offset for window alignment
    offset: Duration,
}

impl TumblingWindowAssigner {
    /// Create a new tumbling window assigner
    pub fn new(size: Duration) -> Self {
        assert!(size > Duration::zero(), "Window size must be positive");
        Self {
            size,
            offset: Duration::zero(),
        }
    }

    /// Create a tumbling window assigner with an offset
    pub fn with_offset(mut self, offset: Duration) -> Self {
        self.offset = offset;
        self
    }

    /// Calculate the window start for a given timestamp
    fn window_start(&self, ts_millis: i64) -> i64 {
        let offset_millis = self.offset.num_milliseconds();
        let size_millis = self.size.num_milliseconds();

        ts_millis
            .saturating_sub(offset_millis)
            .div_euclid(size_millis)
            .saturating_mul(size_millis)
            .saturating_add(offset_millis)
    }
}

impl WindowAssigner for TumblingWindowAssigner {
    fn assign_windows(&self, timestamp: i64) -> Vec<Window> {
        let start = self.window_start(timestamp);
        let end = start.saturating_add(self.size.num_milliseconds());
        // Timestamps outside chrono's range fall back to the global window
        vec![Window::from_millis(start, end).unwrap_or_else(Window::global)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tumbling_window_assignment() {
        let assigner = TumblingWindowAssigner::new(Duration::milliseconds(1000));

        let windows = assigner.assign_windows(500);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].start_timestamp(), 0);
        assert_eq!(windows[0].max_timestamp(), 999);

        let windows = assigner.assign_windows(1500);
        assert_eq!(windows[0].start_timestamp(), 1000);

        // Boundary belongs to the next window
        let windows = assigner.assign_windows(2000);
        assert_eq!(windows[0].start_timestamp(), 2000);
    }

    #[test]
    fn test_tumbling_window_negative_timestamps() {
        let assigner = TumblingWindowAssigner::new(Duration::milliseconds(1000));
        let windows = assigner.assign_windows(-1);
        assert_eq!(windows[0].start_timestamp(), -1000);
        assert_eq!(windows[0].max_timestamp(), -1);
    }

    #[test]
    fn test_tumbling_window_with_offset() {
        let assigner = TumblingWindowAssigner::new(Duration::milliseconds(1000))
            .with_offset(Duration::milliseconds(250));
        let windows = assigner.assign_windows(1100);
        assert_eq!(windows[0].start_timestamp(), 250);
        assert_eq!(windows[0].max_timestamp(), 1249);

        let windows = assigner.assign_windows(1250);
        assert_eq!(windows[0].start_timestamp(), 1250);
    }

    #[test]
    fn test_global_assigner() {
        let windows = GlobalWindowAssigner.assign_windows(123);
        assert_eq!(windows, vec![Window::global()]);
    }

    #[test]
    fn test_assigner_for_config() {
        let tumbling = assigner_for(&WindowConfig::tumbling(10_000));
        assert_eq!(tumbling.assign_windows(12_345)[0].start_timestamp(), 10_000);

        let global = assigner_for(&WindowConfig::global());
        assert!(global.assign_windows(12_345)[0].is_global());
    }
}
