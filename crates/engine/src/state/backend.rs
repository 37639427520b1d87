//! Byte-level storage behind keyed state
//!
//! [`KeyedStateStore`](super::KeyedStateStore) encodes every `(key, cell)`
//! pair into a single byte key and stores bincode-encoded values through this
//! trait, so a backend only has to provide order-agnostic CRUD plus prefix
//! listing.

use async_trait::async_trait;

use crate::error::StateResult;

/// Storage interface for keyed state
///
/// Implementations must be safe to share between shard workers. Individual
/// operations are atomic; no cross-key transactions are required because a
/// given key is only ever touched by the shard that owns it.
///
/// ```rust
/// use engine::state::{MemoryStateBackend, StateBackend};
///
/// # tokio_test_block_on(async {
/// let backend = MemoryStateBackend::new();
/// backend.put(b"k1/MyKey", b"v").await.unwrap();
/// assert_eq!(backend.list_keys(b"k1/").await.unwrap().len(), 1);
/// # });
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
#[async_trait]
pub trait StateBackend: Send + Sync {
    /// Value stored under `key`, `None` when absent
    async fn get(&self, key: &[u8]) -> StateResult<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous value
    async fn put(&self, key: &[u8], value: &[u8]) -> StateResult<()>;

    /// Remove `key`; removing an absent key is not an error
    async fn delete(&self, key: &[u8]) -> StateResult<()>;

    /// All keys starting with `prefix`; the empty prefix matches everything
    async fn list_keys(&self, prefix: &[u8]) -> StateResult<Vec<Vec<u8>>>;

    /// Remove every key starting with `prefix`, returning how many were removed
    async fn delete_prefix(&self, prefix: &[u8]) -> StateResult<usize> {
        let keys = self.list_keys(prefix).await?;
        let removed = keys.len();
        for key in keys {
            self.delete(&key).await?;
        }
        Ok(removed)
    }

    /// Remove all state
    async fn clear(&self) -> StateResult<()> {
        self.delete_prefix(b"").await.map(|_| ())
    }

    /// Number of stored keys
    async fn count(&self) -> StateResult<usize> {
        Ok(self.list_keys(b"").await?.len())
    }

    /// Whether `key` holds a value
    async fn contains(&self, key: &[u8]) -> StateResult<bool> {
        Ok(self.get(key).await?.is_some())
    }
}

/// Shared conformance checks for backend implementations
#[cfg(test)]
pub mod tests {
    use super::*;

    pub async fn check_basic_ops<B: StateBackend>(backend: &B) {
        backend.put(b"a/MyKey", b"1").await.unwrap();
        assert_eq!(backend.get(b"a/MyKey").await.unwrap(), Some(b"1".to_vec()));
        assert_eq!(backend.get(b"missing").await.unwrap(), None);

        backend.put(b"a/MyKey", b"2").await.unwrap();
        assert_eq!(backend.get(b"a/MyKey").await.unwrap(), Some(b"2".to_vec()));

        backend.delete(b"a/MyKey").await.unwrap();
        assert!(!backend.contains(b"a/MyKey").await.unwrap());

        // Idempotent
        backend.delete(b"a/MyKey").await.unwrap();
    }

    pub async fn check_prefix_ops<B: StateBackend>(backend: &B) {
        backend.clear().await.unwrap();

        backend.put(b"a/x", b"1").await.unwrap();
        backend.put(b"a/y", b"2").await.unwrap();
        backend.put(b"b/x", b"3").await.unwrap();

        assert_eq!(backend.list_keys(b"a/").await.unwrap().len(), 2);
        assert_eq!(backend.count().await.unwrap(), 3);

        assert_eq!(backend.delete_prefix(b"a/").await.unwrap(), 2);
        assert_eq!(backend.count().await.unwrap(), 1);
        assert!(backend.contains(b"b/x").await.unwrap());

        backend.clear().await.unwrap();
        assert_eq!(backend.count().await.unwrap(), 0);
    }
}
