use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use tracing::trace;

use super::{FiredTimer, KeyTimerStatus, TimerPhase, TimerSlot};
use crate::core::EngineKey;
use crate::watermark::Watermark;
use crate::window::Window;

#[derive(Debug, Clone)]
struct PendingTimer {
    fire_at: i64,
    generation: u64,
    window: Window,
}

/// Counters kept by a [`TimerRegistry`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub set: u64,
    /// Sets that replaced a pending timestamp
    pub overwritten: u64,
    /// Clears that cancelled a pending timer
    pub cleared: u64,
    pub taken: u64,
}

/// Pending event-time timers for the keys of one shard
///
/// Slots live in a map for lookups and in a queue ordered by
/// `(fire_at, generation)` for draining at a watermark.
#[derive(Debug)]
pub struct TimerRegistry<K: EngineKey> {
    slots: HashMap<TimerSlot<K>, PendingTimer>,
    queue: BTreeSet<(i64, u64, TimerSlot<K>)>,
    next_generation: u64,
    firing: Option<TimerSlot<K>>,
    stats: RegistryStats,
}

impl<K: EngineKey> Default for TimerRegistry<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: EngineKey> TimerRegistry<K> {
    pub fn new() -> Self {
        Self {
            slots: HashMap::new(),
            queue: BTreeSet::new(),
            next_generation: 1,
            firing: None,
            stats: RegistryStats::default(),
        }
    }

    /// Arm or re-arm a slot
    ///
    /// Returns `true` when a pending timestamp was replaced.
    pub fn set(
        &mut self,
        key: K,
        family: &str,
        tag: &str,
        timestamp: i64,
        window: Window,
    ) -> bool {
        let slot = TimerSlot::new(key, family, tag);
        let generation = self.next_generation;
        self.next_generation += 1;

        let previous = self.slots.insert(
            slot.clone(),
            PendingTimer {
                fire_at: timestamp,
                generation,
                window,
            },
        );
        let overwritten = match previous {
            Some(old) => {
                self.queue.remove(&(old.fire_at, old.generation, slot.clone()));
                self.stats.overwritten += 1;
                true
            }
            None => false,
        };
        self.queue.insert((timestamp, generation, slot));
        self.stats.set += 1;

        trace!(family, tag, timestamp, generation, overwritten, "Timer set");
        overwritten
    }

    /// Cancel a pending slot, returning whether one was pending
    pub fn clear(&mut self, key: &K, family: &str, tag: &str) -> bool {
        let slot = TimerSlot::new(key.clone(), family, tag);
        match self.slots.remove(&slot) {
            Some(pending) => {
                self.queue
                    .remove(&(pending.fire_at, pending.generation, slot));
                self.stats.cleared += 1;
                true
            }
            None => false,
        }
    }

    /// Pending fire timestamp of a slot
    pub fn pending(&self, key: &K, family: &str, tag: &str) -> Option<i64> {
        self.slots
            .get(&TimerSlot::new(key.clone(), family, tag))
            .map(|pending| pending.fire_at)
    }

    /// Remove and return every timer with `fire_at <= watermark`
    ///
    /// Ordered by `(fire_at, generation)`. A returned slot is no longer
    /// pending, so it cannot be returned again unless it is re-armed.
    pub fn take_eligible(&mut self, watermark: Watermark) -> Vec<(K, FiredTimer)> {
        let mut fired = Vec::new();

        while let Some((fire_at, _, _)) = self.queue.first() {
            if !watermark.has_passed(*fire_at) {
                break;
            }
            let Some((fire_at, generation, slot)) = self.queue.pop_first() else {
                break;
            };
            let window = match self.slots.remove(&slot) {
                Some(pending) => pending.window,
                None => continue,
            };
            fired.push((
                slot.key,
                FiredTimer {
                    family: slot.family,
                    tag: slot.tag,
                    timestamp: fire_at,
                    window,
                    generation,
                },
            ));
        }

        self.stats.taken += fired.len() as u64;
        fired
    }

    /// Earliest pending fire timestamp
    pub fn next_fire_timestamp(&self) -> Option<i64> {
        self.queue.first().map(|(fire_at, _, _)| *fire_at)
    }

    /// Pending `(family, tag, timestamp)` triples for one key, sorted
    pub fn pending_for_key(&self, key: &K) -> Vec<(String, String, i64)> {
        let mut pending: Vec<_> = self
            .slots
            .iter()
            .filter(|(slot, _)| &slot.key == key)
            .map(|(slot, timer)| (slot.family.clone(), slot.tag.clone(), timer.fire_at))
            .collect();
        pending.sort();
        pending
    }

    /// Mark a slot as running its callback
    pub fn begin_firing(&mut self, key: &K, family: &str, tag: &str) {
        self.firing = Some(TimerSlot::new(key.clone(), family, tag));
    }

    pub fn end_firing(&mut self) {
        self.firing = None;
    }

    /// Phase of a slot
    pub fn phase(&self, key: &K, family: &str, tag: &str) -> TimerPhase {
        let slot = TimerSlot::new(key.clone(), family, tag);
        if self.firing.as_ref() == Some(&slot) {
            TimerPhase::Firing
        } else if self.slots.contains_key(&slot) {
            TimerPhase::Armed
        } else {
            TimerPhase::Idle
        }
    }

    /// Status of a slot for diagnostics
    pub fn status(&self, key: &K, family: &str, tag: &str) -> KeyTimerStatus {
        KeyTimerStatus {
            family: family.to_string(),
            tag: tag.to_string(),
            phase: self.phase(key, family, tag),
            pending_timestamp: self.pending(key, family, tag),
        }
    }

    /// Number of pending timers
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(start: i64, end: i64) -> Window {
        Window::from_millis(start, end).unwrap()
    }

    #[test]
    fn test_rearm_replaces_pending_timestamp() {
        let mut registry = TimerRegistry::new();

        assert!(!registry.set("k".to_string(), "Callback", "", 100, window(0, 1000)));
        assert!(registry.set("k".to_string(), "Callback", "", 200, window(0, 1000)));
        assert!(registry.set("k".to_string(), "Callback", "", 150, window(0, 1000)));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.pending(&"k".to_string(), "Callback", ""), Some(150));
        assert_eq!(registry.stats().overwritten, 2);

        // The replaced timestamps are gone from the queue
        assert!(registry.take_eligible(Watermark::new(120)).is_empty());
        let fired = registry.take_eligible(Watermark::new(150));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].1.timestamp, 150);
        assert_eq!(fired[0].1.generation, 3);
        assert!(registry.take_eligible(Watermark::max()).is_empty());
    }

    #[test]
    fn test_take_eligible_respects_watermark() {
        let mut registry = TimerRegistry::new();
        registry.set(1u32, "F", "", 10, window(0, 100));
        registry.set(2u32, "F", "", 20, window(0, 100));
        registry.set(3u32, "F", "", 30, window(0, 100));

        assert_eq!(registry.next_fire_timestamp(), Some(10));
        assert!(registry.take_eligible(Watermark::new(9)).is_empty());

        let fired: Vec<u32> = registry
            .take_eligible(Watermark::new(20))
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        assert_eq!(fired, vec![1, 2]);
        assert_eq!(registry.next_fire_timestamp(), Some(30));
    }

    #[test]
    fn test_same_timestamp_orders_by_generation() {
        let mut registry = TimerRegistry::new();
        registry.set(9u32, "F", "", 10, window(0, 100));
        registry.set(1u32, "F", "", 10, window(0, 100));

        let keys: Vec<u32> = registry
            .take_eligible(Watermark::new(10))
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        assert_eq!(keys, vec![9, 1]);
    }

    #[test]
    fn test_clear_cancels_pending() {
        let mut registry = TimerRegistry::new();
        registry.set(1u32, "F", "", 10, window(0, 100));

        assert!(registry.clear(&1, "F", ""));
        assert!(!registry.clear(&1, "F", ""));
        assert!(registry.take_eligible(Watermark::max()).is_empty());
        assert_eq!(registry.stats().cleared, 1);
    }

    #[test]
    fn test_tags_are_independent_slots() {
        let mut registry = TimerRegistry::new();
        registry.set(1u32, "F", "a", 10, window(0, 100));
        registry.set(1u32, "F", "b", 20, window(0, 100));
        registry.set(1u32, "G", "", 5, window(0, 100));

        assert_eq!(
            registry.pending_for_key(&1),
            vec![
                ("F".to_string(), "a".to_string(), 10),
                ("F".to_string(), "b".to_string(), 20),
                ("G".to_string(), String::new(), 5),
            ]
        );
        assert_eq!(registry.take_eligible(Watermark::max()).len(), 3);
    }

    #[test]
    fn test_phases() {
        let mut registry = TimerRegistry::new();
        assert_eq!(registry.phase(&1u32, "F", ""), TimerPhase::Idle);

        registry.set(1u32, "F", "", 10, window(0, 100));
        assert_eq!(registry.phase(&1, "F", ""), TimerPhase::Armed);

        registry.take_eligible(Watermark::new(10));
        registry.begin_firing(&1, "F", "");
        assert_eq!(registry.status(&1, "F", "").phase, TimerPhase::Firing);

        registry.end_firing();
        assert_eq!(registry.phase(&1, "F", ""), TimerPhase::Idle);
    }
}
