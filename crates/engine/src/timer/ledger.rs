use std::collections::HashMap;

use super::FiredTimer;
use crate::core::EngineKey;
use crate::error::{TimerError, TimerResult};

/// Last delivered generation per timer slot
///
/// Generations only grow, so a delivery whose generation is not newer than
/// the last one recorded for the slot is a duplicate. Entries are grouped by
/// key so a key whose state is gone can be forgotten in one step.
#[derive(Debug)]
pub struct FiringLedger<K: EngineKey> {
    delivered: HashMap<K, HashMap<(String, String), u64>>,
    total: u64,
}

impl<K: EngineKey> Default for FiringLedger<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: EngineKey> FiringLedger<K> {
    pub fn new() -> Self {
        Self {
            delivered: HashMap::new(),
            total: 0,
        }
    }

    /// Record a delivery, rejecting duplicates
    pub fn record(&mut self, key: &K, timer: &FiredTimer) -> TimerResult<()> {
        let slots = self.delivered.entry(key.clone()).or_default();
        let slot = (timer.family.clone(), timer.tag.clone());

        if let Some(&last) = slots.get(&slot) {
            if timer.generation <= last {
                return Err(TimerError::DuplicateFiring {
                    key: key.to_string(),
                    family: timer.family.clone(),
                    tag: timer.tag.clone(),
                    generation: timer.generation,
                    last_delivered: last,
                });
            }
        }

        slots.insert(slot, timer.generation);
        self.total += 1;
        Ok(())
    }

    /// Drop every entry of `key`, returning how many slots were tracked
    ///
    /// Any later arm of those slots gets a newer generation than the
    /// forgotten ones, so duplicates are still caught.
    pub fn forget_key(&mut self, key: &K) -> usize {
        self.delivered.remove(key).map_or(0, |slots| slots.len())
    }

    /// Number of slots of `key` that have fired at least once
    pub fn slots_delivered_for_key(&self, key: &K) -> usize {
        self.delivered.get(key).map_or(0, HashMap::len)
    }

    /// Number of keys with tracked deliveries
    pub fn tracked_keys(&self) -> usize {
        self.delivered.len()
    }

    /// Total deliveries recorded
    pub fn total(&self) -> u64 {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::Window;

    fn fired(generation: u64) -> FiredTimer {
        FiredTimer {
            family: "Callback".to_string(),
            tag: String::new(),
            timestamp: 4093,
            window: Window::global(),
            generation,
        }
    }

    #[test]
    fn test_duplicate_generation_rejected() {
        let mut ledger = FiringLedger::new();
        ledger.record(&"k".to_string(), &fired(3)).unwrap();

        let err = ledger.record(&"k".to_string(), &fired(3)).unwrap_err();
        assert!(matches!(
            err,
            TimerError::DuplicateFiring {
                generation: 3,
                last_delivered: 3,
                ..
            }
        ));
        assert!(ledger.record(&"k".to_string(), &fired(2)).is_err());
    }

    #[test]
    fn test_new_arm_cycle_accepted() {
        let mut ledger = FiringLedger::new();
        ledger.record(&"k".to_string(), &fired(3)).unwrap();
        ledger.record(&"k".to_string(), &fired(7)).unwrap();
        ledger.record(&"other".to_string(), &fired(1)).unwrap();

        assert_eq!(ledger.total(), 3);
        assert_eq!(ledger.slots_delivered_for_key(&"k".to_string()), 1);
    }

    #[test]
    fn test_forget_key_releases_entries() {
        let mut ledger = FiringLedger::new();
        ledger.record(&"k".to_string(), &fired(3)).unwrap();
        ledger.record(&"other".to_string(), &fired(4)).unwrap();

        assert_eq!(ledger.forget_key(&"k".to_string()), 1);
        assert_eq!(ledger.forget_key(&"k".to_string()), 0);
        assert_eq!(ledger.tracked_keys(), 1);

        // A fresh arm cycle of the forgotten key is still accepted
        ledger.record(&"k".to_string(), &fired(9)).unwrap();
        assert_eq!(ledger.slots_delivered_for_key(&"k".to_string()), 1);
        assert_eq!(ledger.total(), 3);
    }
}
