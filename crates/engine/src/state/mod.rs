//! Keyed state
//!
//! State is scoped per key: a cell is addressed by `(key, cell name)` and
//! holds at most one value. Values are bincode-encoded and kept in a
//! [`StateBackend`]; the in-process [`MemoryStateBackend`] is the default.
//!
//! ```rust
//! use engine::state::KeyedStateStore;
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let store = KeyedStateStore::in_memory();
//! store.write("key-1", "MyKey", "key-1").await.unwrap();
//!
//! let value: Option<String> = store.read("key-1", "MyKey").await.unwrap();
//! assert_eq!(value.as_deref(), Some("key-1"));
//! assert_eq!(store.read::<_, String>("key-2", "MyKey").await.unwrap(), None);
//! # });
//! ```

pub mod backend;
pub mod keyed;
pub mod memory;
pub mod value;

pub use backend::StateBackend;
pub use keyed::KeyedStateStore;
pub use memory::{MemoryBackendStats, MemoryStateBackend};
pub use value::ValueState;
