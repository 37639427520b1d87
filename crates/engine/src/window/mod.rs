//! Windowing for keyed elements
//!
//! Every element is processed in exactly the windows it is assigned to. Two
//! strategies are supported:
//!
//! ## Global window
//! One window spanning all of event time. Timers armed at its max timestamp
//! fire when input is exhausted and the watermark reaches `+∞`.
//!
//! ## Tumbling windows
//! Fixed-size, non-overlapping windows. Each element belongs to exactly one.
//!
//! ```text
//! Time:     0----5----10---15---20---25---30
//! Windows:  [----][----][----][----][----]
//! ```
//!
//! # Example
//!
//! ```rust
//! use engine::window::{TumblingWindowAssigner, WindowAssigner};
//! use chrono::Duration;
//!
//! let tumbling = TumblingWindowAssigner::new(Duration::seconds(10));
//! let windows = tumbling.assign_windows(12_500);
//! assert_eq!(windows[0].start_timestamp(), 10_000);
//! assert_eq!(windows[0].max_timestamp(), 19_999);
//! ```

pub mod assigner;
pub mod types;

pub use assigner::{assigner_for, GlobalWindowAssigner, TumblingWindowAssigner, WindowAssigner};
pub use types::{Window, WindowBounds, GLOBAL_WINDOW_ID};
