//! Per-key state cells
//!
//! A cell is addressed by `(key, cell name)` and encoded as
//! `bincode(key) ++ '/' ++ name`. Bincode prefixes strings and sequences
//! with their length, so the prefix of one key never matches another key's
//! cells.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::trace;

use super::backend::StateBackend;
use super::memory::MemoryStateBackend;
use crate::error::{StateError, StateResult};

const CELL_SEPARATOR: u8 = b'/';

/// Typed key/cell view over a [`StateBackend`]
#[derive(Clone)]
pub struct KeyedStateStore {
    backend: Arc<dyn StateBackend>,
}

impl std::fmt::Debug for KeyedStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedStateStore").finish_non_exhaustive()
    }
}

impl Default for KeyedStateStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl KeyedStateStore {
    pub fn new(backend: Arc<dyn StateBackend>) -> Self {
        Self { backend }
    }

    /// Store backed by a fresh [`MemoryStateBackend`]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStateBackend::new()))
    }

    pub fn backend(&self) -> &Arc<dyn StateBackend> {
        &self.backend
    }

    /// Value of `cell` for `key`, `None` if never written or cleared
    pub async fn read<K, T>(&self, key: &K, cell: &str) -> StateResult<Option<T>>
    where
        K: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let address = cell_address(key, cell)?;
        match self.backend.get(&address).await? {
            Some(bytes) => bincode::deserialize(&bytes).map(Some).map_err(|e| {
                StateError::DeserializationFailed {
                    cell: cell.to_string(),
                    reason: e.to_string(),
                }
            }),
            None => Ok(None),
        }
    }

    /// Store `value` in `cell` for `key`, replacing any prior value
    pub async fn write<K, T>(&self, key: &K, cell: &str, value: &T) -> StateResult<()>
    where
        K: Serialize + ?Sized,
        T: Serialize + ?Sized,
    {
        let address = cell_address(key, cell)?;
        let bytes = bincode::serialize(value).map_err(|e| StateError::SerializationFailed {
            cell: cell.to_string(),
            reason: e.to_string(),
        })?;
        trace!(cell, bytes = bytes.len(), "Writing state cell");
        self.backend.put(&address, &bytes).await
    }

    /// Remove `cell` for `key`; no-op when absent
    pub async fn clear<K>(&self, key: &K, cell: &str) -> StateResult<()>
    where
        K: Serialize + ?Sized,
    {
        let address = cell_address(key, cell)?;
        self.backend.delete(&address).await
    }

    /// Remove every cell of `key`, returning how many were removed
    pub async fn clear_key<K>(&self, key: &K) -> StateResult<usize>
    where
        K: Serialize + ?Sized,
    {
        let prefix = key_prefix(key)?;
        self.backend.delete_prefix(&prefix).await
    }

    /// Names of the cells currently holding a value for `key`, sorted
    pub async fn cell_names<K>(&self, key: &K) -> StateResult<Vec<String>>
    where
        K: Serialize + ?Sized,
    {
        let prefix = key_prefix(key)?;
        let mut names: Vec<String> = self
            .backend
            .list_keys(&prefix)
            .await?
            .into_iter()
            .filter_map(|address| {
                address
                    .get(prefix.len()..)
                    .and_then(|name| std::str::from_utf8(name).ok())
                    .map(str::to_string)
            })
            .collect();
        names.sort();
        Ok(names)
    }
}

fn key_prefix<K: Serialize + ?Sized>(key: &K) -> StateResult<Vec<u8>> {
    let mut prefix = bincode::serialize(key).map_err(|e| StateError::SerializationFailed {
        cell: "<key>".to_string(),
        reason: e.to_string(),
    })?;
    prefix.push(CELL_SEPARATOR);
    Ok(prefix)
}

fn cell_address<K: Serialize + ?Sized>(key: &K, cell: &str) -> StateResult<Vec<u8>> {
    let mut address = key_prefix(key)?;
    address.extend_from_slice(cell.as_bytes());
    Ok(address)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_write_clear() {
        let store = KeyedStateStore::in_memory();

        assert_eq!(store.read::<_, i64>("k1", "MyKey").await.unwrap(), None);

        store.write("k1", "MyKey", &42i64).await.unwrap();
        store.write("k1", "MyKey", &43i64).await.unwrap();
        assert_eq!(store.read::<_, i64>("k1", "MyKey").await.unwrap(), Some(43));

        store.clear("k1", "MyKey").await.unwrap();
        assert_eq!(store.read::<_, i64>("k1", "MyKey").await.unwrap(), None);

        // Clearing an absent cell is a no-op
        store.clear("k1", "MyKey").await.unwrap();
    }

    #[tokio::test]
    async fn test_keys_do_not_interfere() {
        let store = KeyedStateStore::in_memory();

        store.write("a", "MyKey", &1i64).await.unwrap();
        store.write("ab", "MyKey", &2i64).await.unwrap();

        assert_eq!(store.clear_key("a").await.unwrap(), 1);
        assert_eq!(store.read::<_, i64>("a", "MyKey").await.unwrap(), None);
        assert_eq!(store.read::<_, i64>("ab", "MyKey").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_cell_names() {
        let store = KeyedStateStore::in_memory();

        store.write(&7u32, "zeta", &"z").await.unwrap();
        store.write(&7u32, "alpha", &"a").await.unwrap();
        store.write(&8u32, "other", &"o").await.unwrap();

        assert_eq!(store.cell_names(&7u32).await.unwrap(), vec!["alpha", "zeta"]);
    }

    #[tokio::test]
    async fn test_type_mismatch_is_deserialization_error() {
        let store = KeyedStateStore::in_memory();
        store.write("k", "MyKey", &1u8).await.unwrap();

        let err = store.read::<_, String>("k", "MyKey").await.unwrap_err();
        assert!(matches!(err, StateError::DeserializationFailed { .. }));
    }
}
