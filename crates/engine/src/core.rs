//! Core data types shared by every engine component
//!
//! - [`KV`]: plain key/value record used for keyed inputs and outputs
//! - [`EngineKey`]: bound every partitioning key must satisfy
//! - [`TimestampedElement`]: a keyed element with its event time and window
//! - [`SourceEvent`]: what a source hands to the executor

use crate::watermark::Watermark;
use crate::window::Window;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;

/// A key/value pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KV<K, V> {
    pub key: K,
    pub value: V,
}

impl<K, V> KV<K, V> {
    pub fn new(key: K, value: V) -> Self {
        Self { key, value }
    }
}

impl<K: fmt::Display, V: fmt::Display> fmt::Display for KV<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.key, self.value)
    }
}

/// Bound for partitioning keys
///
/// Keys are hashed for shard routing, ordered for deterministic timer queues,
/// and bincode-encoded to address state cells.
pub trait EngineKey:
    Clone + Eq + Hash + Ord + fmt::Debug + fmt::Display + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> EngineKey for T where
    T: Clone
        + Eq
        + Hash
        + Ord
        + fmt::Debug
        + fmt::Display
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// A keyed element with its event time
///
/// `window` is set when the element already belongs to a window (for example
/// a windowed impulse); otherwise the executor's assigner decides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestampedElement<K, V> {
    pub key: K,
    pub value: V,
    /// Event time in milliseconds since epoch
    pub timestamp: i64,
    pub window: Option<Window>,
}

impl<K, V> TimestampedElement<K, V> {
    pub fn new(key: K, value: V, timestamp: i64) -> Self {
        Self {
            key,
            value,
            timestamp,
            window: None,
        }
    }

    pub fn with_window(mut self, window: Window) -> Self {
        self.window = Some(window);
        self
    }
}

/// Event produced by a source
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent<T> {
    /// A data element at an event time, optionally already windowed
    Element {
        value: T,
        timestamp: i64,
        window: Option<Window>,
    },
    /// No more elements below this watermark will arrive
    Watermark(Watermark),
}

impl<T> SourceEvent<T> {
    pub fn element(value: T, timestamp: i64) -> Self {
        SourceEvent::Element {
            value,
            timestamp,
            window: None,
        }
    }

    /// Map the element payload, leaving watermarks untouched
    pub fn map<U, F>(self, f: F) -> SourceEvent<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            SourceEvent::Element {
                value,
                timestamp,
                window,
            } => SourceEvent::Element {
                value: f(value),
                timestamp,
                window,
            },
            SourceEvent::Watermark(wm) => SourceEvent::Watermark(wm),
        }
    }
}
