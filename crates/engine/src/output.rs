//! Output collection
//!
//! Records emitted by element processing and timer callbacks from every
//! shard end up in one unordered bag. Nothing is deduplicated.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Which callback produced a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputOrigin {
    Element,
    Timer,
}

#[derive(Debug)]
struct Inner<O> {
    records: Mutex<Vec<O>>,
    from_elements: AtomicU64,
    from_timers: AtomicU64,
}

/// Shared sink for output records
///
/// Clones share the same storage.
#[derive(Debug)]
pub struct OutputCollector<O> {
    inner: Arc<Inner<O>>,
}

impl<O> Clone for OutputCollector<O> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<O> Default for OutputCollector<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O> OutputCollector<O> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                records: Mutex::new(Vec::new()),
                from_elements: AtomicU64::new(0),
                from_timers: AtomicU64::new(0),
            }),
        }
    }

    pub fn push(&self, origin: OutputOrigin, record: O) {
        self.inner.records.lock().push(record);
        self.count(origin, 1);
    }

    /// Append a batch emitted by one callback
    pub fn extend(&self, origin: OutputOrigin, records: Vec<O>) {
        if records.is_empty() {
            return;
        }
        self.count(origin, records.len() as u64);
        self.inner.records.lock().extend(records);
    }

    fn count(&self, origin: OutputOrigin, n: u64) {
        let counter = match origin {
            OutputOrigin::Element => &self.inner.from_elements,
            OutputOrigin::Timer => &self.inner.from_timers,
        };
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.inner.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records emitted while processing elements
    pub fn from_elements(&self) -> u64 {
        self.inner.from_elements.load(Ordering::Relaxed)
    }

    /// Records emitted from timer callbacks
    pub fn from_timers(&self) -> u64 {
        self.inner.from_timers.load(Ordering::Relaxed)
    }

    /// Drop every record and zero the per-origin counters
    pub fn clear(&self) {
        self.inner.records.lock().clear();
        self.inner.from_elements.store(0, Ordering::Relaxed);
        self.inner.from_timers.store(0, Ordering::Relaxed);
    }

    /// Remove and return everything collected so far
    pub fn drain(&self) -> Vec<O> {
        std::mem::take(&mut *self.inner.records.lock())
    }
}

impl<O: Clone> OutputCollector<O> {
    /// Copy of the collected records in arrival order
    pub fn records(&self) -> Vec<O> {
        self.inner.records.lock().clone()
    }
}

impl<O: Clone + Eq + Hash> OutputCollector<O> {
    /// Collected records with their multiplicities
    pub fn multiset(&self) -> HashMap<O, usize> {
        let mut counts = HashMap::new();
        for record in self.inner.records.lock().iter() {
            *counts.entry(record.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// How many times `record` was emitted
    pub fn count_of(&self, record: &O) -> usize {
        self.inner
            .records
            .lock()
            .iter()
            .filter(|r| *r == record)
            .count()
    }
}
