use crate::context::KeyedContext;
use crate::core::EngineKey;
use crate::error::Result;

use super::{FiredTimer, DEFAULT_TAG};

/// Handle to an event-time timer family
///
/// Like [`ValueState`](crate::state::ValueState) it only carries a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTimeTimer {
    family: String,
}

impl EventTimeTimer {
    pub fn new(family: impl Into<String>) -> Self {
        Self {
            family: family.into(),
        }
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    /// Whether a fired timer belongs to this family
    pub fn matches(&self, timer: &FiredTimer) -> bool {
        timer.family == self.family
    }

    /// Arm the family's untagged slot for the current key
    pub fn set<K: EngineKey, O>(&self, ctx: &mut KeyedContext<'_, K, O>, timestamp: i64) -> Result<bool> {
        ctx.set_timer(&self.family, DEFAULT_TAG, timestamp)
    }

    pub fn set_with_tag<K: EngineKey, O>(
        &self,
        ctx: &mut KeyedContext<'_, K, O>,
        tag: &str,
        timestamp: i64,
    ) -> Result<bool> {
        ctx.set_timer(&self.family, tag, timestamp)
    }

    /// Arm the untagged slot at the end of the current window
    pub fn set_at_window_end<K: EngineKey, O>(&self, ctx: &mut KeyedContext<'_, K, O>) -> Result<bool> {
        let timestamp = ctx.window().max_timestamp();
        self.set(ctx, timestamp)
    }

    pub fn clear<K: EngineKey, O>(&self, ctx: &mut KeyedContext<'_, K, O>) -> Result<bool> {
        ctx.clear_timer(&self.family, DEFAULT_TAG)
    }

    pub fn clear_with_tag<K: EngineKey, O>(&self, ctx: &mut KeyedContext<'_, K, O>, tag: &str) -> Result<bool> {
        ctx.clear_timer(&self.family, tag)
    }
}
