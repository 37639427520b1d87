use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;

use crate::context::KeyedContext;
use crate::core::EngineKey;
use crate::error::Result;

/// Typed handle to a single-value state cell
///
/// A descriptor only: it holds the cell name and no backend reference, so a
/// function can keep handles as plain fields and use them against whichever
/// key's context it is called with.
///
/// ```rust
/// use engine::state::ValueState;
///
/// let my_key = ValueState::<String>::new("MyKey");
/// assert_eq!(my_key.name(), "MyKey");
/// ```
#[derive(Debug)]
pub struct ValueState<T> {
    name: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for ValueState<T> {
    fn clone(&self) -> Self {
        Self::new(self.name.clone())
    }
}

impl<T> ValueState<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T> ValueState<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    pub async fn read<K: EngineKey, O>(&self, ctx: &KeyedContext<'_, K, O>) -> Result<Option<T>> {
        ctx.read_state(&self.name).await
    }

    /// Read the value, failing the run when it was never written
    pub async fn read_required<K: EngineKey, O>(&self, ctx: &KeyedContext<'_, K, O>) -> Result<T> {
        ctx.require_state(&self.name).await
    }

    pub async fn write<K: EngineKey, O>(&self, ctx: &KeyedContext<'_, K, O>, value: &T) -> Result<()> {
        ctx.write_state(&self.name, value).await
    }

    pub async fn clear<K: EngineKey, O>(&self, ctx: &KeyedContext<'_, K, O>) -> Result<()> {
        ctx.clear_state(&self.name).await
    }
}
