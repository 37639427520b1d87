//! In-memory state backend
//!
//! A DashMap keyed by the encoded cell address. Shards touch disjoint key
//! prefixes, so contention is limited to DashMap's internal sharding.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

use super::backend::StateBackend;
use crate::error::StateResult;

/// Access statistics for [`MemoryStateBackend`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MemoryBackendStats {
    /// Entries currently stored
    pub total_entries: usize,
    /// Bytes held by keys and values
    pub total_bytes: usize,
    pub get_count: u64,
    pub put_count: u64,
    pub delete_count: u64,
    /// Gets that found a value
    pub hit_count: u64,
    /// Gets that found nothing
    pub miss_count: u64,
}

#[derive(Debug, Default)]
struct Counters {
    gets: AtomicU64,
    puts: AtomicU64,
    deletes: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// DashMap-backed [`StateBackend`]
///
/// Cloning is cheap and shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateBackend {
    data: Arc<DashMap<Vec<u8>, Vec<u8>>>,
    counters: Arc<Counters>,
}

impl MemoryStateBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the access statistics
    pub fn stats(&self) -> MemoryBackendStats {
        MemoryBackendStats {
            total_entries: self.data.len(),
            total_bytes: self.memory_usage(),
            get_count: self.counters.gets.load(Ordering::Relaxed),
            put_count: self.counters.puts.load(Ordering::Relaxed),
            delete_count: self.counters.deletes.load(Ordering::Relaxed),
            hit_count: self.counters.hits.load(Ordering::Relaxed),
            miss_count: self.counters.misses.load(Ordering::Relaxed),
        }
    }

    /// Approximate bytes held by keys and values
    pub fn memory_usage(&self) -> usize {
        self.data
            .iter()
            .map(|entry| entry.key().len() + entry.value().len())
            .sum()
    }

    /// Copy of every stored entry, sorted by key
    pub fn snapshot(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut entries: Vec<_> = self
            .data
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        entries.sort();
        entries
    }
}

#[async_trait]
impl StateBackend for MemoryStateBackend {
    async fn get(&self, key: &[u8]) -> StateResult<Option<Vec<u8>>> {
        self.counters.gets.fetch_add(1, Ordering::Relaxed);

        let value = self.data.get(key).map(|entry| entry.value().clone());
        match value {
            Some(_) => self.counters.hits.fetch_add(1, Ordering::Relaxed),
            None => self.counters.misses.fetch_add(1, Ordering::Relaxed),
        };

        trace!(key_len = key.len(), hit = value.is_some(), "State get");
        Ok(value)
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> StateResult<()> {
        self.counters.puts.fetch_add(1, Ordering::Relaxed);
        trace!(key_len = key.len(), value_len = value.len(), "State put");
        self.data.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> StateResult<()> {
        self.counters.deletes.fetch_add(1, Ordering::Relaxed);
        self.data.remove(key);
        Ok(())
    }

    async fn list_keys(&self, prefix: &[u8]) -> StateResult<Vec<Vec<u8>>> {
        Ok(self
            .data
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect())
    }

    async fn delete_prefix(&self, prefix: &[u8]) -> StateResult<usize> {
        let before = self.data.len();
        self.data.retain(|key, _| !key.starts_with(prefix));
        let removed = before.saturating_sub(self.data.len());
        self.counters
            .deletes
            .fetch_add(removed as u64, Ordering::Relaxed);
        Ok(removed)
    }

    async fn clear(&self) -> StateResult<()> {
        debug!(entries = self.data.len(), "Clearing all state");
        self.data.clear();
        Ok(())
    }

    async fn count(&self) -> StateResult<usize> {
        Ok(self.data.len())
    }

    async fn contains(&self, key: &[u8]) -> StateResult<bool> {
        Ok(self.data.contains_key(key))
    }
}
