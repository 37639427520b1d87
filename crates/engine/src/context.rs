//! Callback context handed to keyed functions
//!
//! A [`KeyedContext`] is scoped to one key for the duration of one
//! `process_element` or `on_timer` call. It exposes that key's state cells
//! and timer slots, checked against the function's [`Capabilities`], and an
//! emit sink.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::capabilities::Capabilities;
use crate::core::EngineKey;
use crate::error::{EngineError, Result};
use crate::state::KeyedStateStore;
use crate::timer::TimerRegistry;
use crate::watermark::Watermark;
use crate::window::Window;

/// Per-key view of state, timers and output
pub struct KeyedContext<'a, K: EngineKey, O> {
    key: &'a K,
    window: &'a Window,
    timestamp: i64,
    watermark: Watermark,
    store: &'a KeyedStateStore,
    timers: &'a mut TimerRegistry<K>,
    capabilities: &'a Capabilities,
    emitted: Vec<O>,
    state_cleared: AtomicBool,
}

impl<'a, K: EngineKey, O> KeyedContext<'a, K, O> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        key: &'a K,
        window: &'a Window,
        timestamp: i64,
        watermark: Watermark,
        store: &'a KeyedStateStore,
        timers: &'a mut TimerRegistry<K>,
        capabilities: &'a Capabilities,
    ) -> Self {
        Self {
            key,
            window,
            timestamp,
            watermark,
            store,
            timers,
            capabilities,
            emitted: Vec::new(),
            state_cleared: AtomicBool::new(false),
        }
    }

    pub fn key(&self) -> &K {
        self.key
    }

    /// Window of the element being processed, or the window the firing
    /// timer was armed in
    pub fn window(&self) -> &Window {
        self.window
    }

    /// Event time of the element, or the fire timestamp of the timer
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn watermark(&self) -> Watermark {
        self.watermark
    }

    /// Read a declared state cell of the current key
    pub async fn read_state<T: DeserializeOwned>(&self, cell: &str) -> Result<Option<T>> {
        self.capabilities.check_cell(cell)?;
        Ok(self.store.read(self.key, cell).await?)
    }

    /// Read a state cell that must have been written before
    pub async fn require_state<T: DeserializeOwned>(&self, cell: &str) -> Result<T> {
        self.read_state(cell).await?.ok_or_else(|| {
            EngineError::contract_violation(
                self.key,
                format!("state cell '{}' must be set", cell),
            )
        })
    }

    /// Write a declared state cell of the current key
    pub async fn write_state<T: Serialize + ?Sized + Sync>(&self, cell: &str, value: &T) -> Result<()> {
        self.capabilities.check_cell(cell)?;
        Ok(self.store.write(self.key, cell, value).await?)
    }

    /// Clear a declared state cell of the current key
    pub async fn clear_state(&self, cell: &str) -> Result<()> {
        self.capabilities.check_cell(cell)?;
        self.store.clear(self.key, cell).await?;
        self.state_cleared.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Arm or re-arm a timer slot of the current key
    ///
    /// Returns `true` when a pending timestamp was replaced.
    pub fn set_timer(&mut self, family: &str, tag: &str, timestamp: i64) -> Result<bool> {
        self.capabilities.check_family(family)?;
        Ok(self
            .timers
            .set(self.key.clone(), family, tag, timestamp, self.window.clone()))
    }

    /// Cancel a pending timer slot of the current key
    pub fn clear_timer(&mut self, family: &str, tag: &str) -> Result<bool> {
        self.capabilities.check_family(family)?;
        Ok(self.timers.clear(self.key, family, tag))
    }

    /// Pending fire timestamp of a timer slot of the current key
    pub fn pending_timer(&self, family: &str, tag: &str) -> Result<Option<i64>> {
        self.capabilities.check_family(family)?;
        Ok(self.timers.pending(self.key, family, tag))
    }

    /// Emit an output record
    pub fn emit(&mut self, record: O) {
        self.emitted.push(record);
    }

    /// Whether a cell of the key was cleared during this callback
    pub(crate) fn cleared_state(&self) -> bool {
        self.state_cleared.load(Ordering::Relaxed)
    }

    pub(crate) fn into_emitted(self) -> Vec<O> {
        self.emitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps() -> Capabilities {
        Capabilities::new()
            .with_timer_family("Callback")
            .with_state_cell("MyKey")
    }

    #[tokio::test]
    async fn test_state_and_timers_scoped_to_key() {
        let store = KeyedStateStore::in_memory();
        let mut timers = TimerRegistry::new();
        let caps = caps();
        let key = "7".to_string();
        let window = Window::global();

        let mut ctx: KeyedContext<'_, String, i64> = KeyedContext::new(
            &key,
            &window,
            0,
            Watermark::min(),
            &store,
            &mut timers,
            &caps,
        );

        ctx.write_state("MyKey", "7").await.unwrap();
        assert!(!ctx.set_timer("Callback", "", window.max_timestamp()).unwrap());
        assert!(ctx.set_timer("Callback", "", window.max_timestamp()).unwrap());
        ctx.emit(5000);
        assert_eq!(
            ctx.pending_timer("Callback", "").unwrap(),
            Some(window.max_timestamp())
        );
        assert_eq!(ctx.into_emitted(), vec![5000]);

        assert_eq!(
            store.read::<_, String>(&key, "MyKey").await.unwrap(),
            Some("7".to_string())
        );
        assert_eq!(timers.len(), 1);
    }

    #[tokio::test]
    async fn test_undeclared_access_is_fatal() {
        let store = KeyedStateStore::in_memory();
        let mut timers = TimerRegistry::new();
        let caps = caps();
        let key = "7".to_string();
        let window = Window::global();

        let mut ctx: KeyedContext<'_, String, i64> = KeyedContext::new(
            &key,
            &window,
            0,
            Watermark::min(),
            &store,
            &mut timers,
            &caps,
        );

        let err = ctx.set_timer("Other", "", 10).unwrap_err();
        assert!(err.is_fatal());

        let err = ctx.write_state("Missing", &1i64).await.unwrap_err();
        assert!(err.is_fatal());

        let err = ctx.require_state::<String>("MyKey").await.unwrap_err();
        assert!(matches!(err, EngineError::ContractViolation { .. }));
    }
}
