//! User logic run per key
//!
//! A [`KeyedProcessFn`] is handed to the executor when it is built. The
//! executor calls `process_element` for every element of a key and
//! `on_timer` for every timer of that key the watermark passes; both calls
//! for one key never overlap.

use async_trait::async_trait;

use crate::capabilities::Capabilities;
use crate::context::KeyedContext;
use crate::core::EngineKey;
use crate::error::Result;
use crate::timer::FiredTimer;

/// Keyed element handler with event-time timer callbacks
///
/// Returning an error whose [`is_fatal`](crate::EngineError::is_fatal) is
/// true aborts the run.
#[async_trait]
pub trait KeyedProcessFn<K: EngineKey, V, O>: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Timer families and state cells this function uses
    fn capabilities(&self) -> Capabilities;

    /// Handle one element of `ctx.key()`
    async fn process_element(&self, ctx: &mut KeyedContext<'_, K, O>, value: V) -> Result<()>;

    /// Handle a timer of `ctx.key()` whose timestamp the watermark reached
    async fn on_timer(&self, ctx: &mut KeyedContext<'_, K, O>, timer: &FiredTimer) -> Result<()>;
}
