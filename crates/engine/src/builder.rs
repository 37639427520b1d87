//! Fluent construction of a [`KeyedExecutor`]

use std::sync::Arc;
use std::time::Duration;

use crate::config::{EngineConfig, ExecutionMode, WindowConfig};
use crate::core::EngineKey;
use crate::error::{EngineError, Result};
use crate::executor::KeyedExecutor;
use crate::function::KeyedProcessFn;
use crate::output::OutputCollector;
use crate::state::{KeyedStateStore, StateBackend};

/// Builder for [`KeyedExecutor`]
///
/// The user function is injected here; there is no global registration.
///
/// ```rust
/// use engine::builder::ExecutorBuilder;
/// use engine::config::ExecutionMode;
/// use engine::scenario::EventTimeFn;
/// use engine::KeyedExecutor;
/// use engine::KV;
///
/// # fn example() -> engine::Result<()> {
/// let executor: KeyedExecutor<String, i64, KV<String, i64>> = ExecutorBuilder::new()
///     .with_mode(ExecutionMode::Unbounded)
///     .with_parallelism(8)
///     .with_max_fire_rounds(32)
///     .with_function(EventTimeFn::default())
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ExecutorBuilder<K: EngineKey, V, O> {
    config: EngineConfig,
    function: Option<Arc<dyn KeyedProcessFn<K, V, O>>>,
    backend: Option<Arc<dyn StateBackend>>,
    output: Option<OutputCollector<O>>,
}

impl<K, V, O> Default for ExecutorBuilder<K, V, O>
where
    K: EngineKey,
    V: Clone + Send + Sync + 'static,
    O: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, O> ExecutorBuilder<K, V, O>
where
    K: EngineKey,
    V: Clone + Send + Sync + 'static,
    O: Send + Sync + 'static,
{
    /// Create a builder with default configuration
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            function: None,
            backend: None,
            output: None,
        }
    }

    /// Replace the whole configuration, e.g. one loaded with
    /// [`EngineConfig::load`]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Set the number of shard workers
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.config.parallelism = parallelism;
        self
    }

    /// Set the per-shard command buffer size
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.config.buffer_size = buffer_size;
        self
    }

    pub fn with_window(mut self, window: WindowConfig) -> Self {
        self.config.window = window;
        self
    }

    /// Assign elements without a window to tumbling windows of `size_ms`
    pub fn with_tumbling_window(mut self, size_ms: u64) -> Self {
        self.config.window = WindowConfig::tumbling(size_ms);
        self
    }

    pub fn with_allowed_lateness(mut self, lateness_ms: u64) -> Self {
        self.config.window.allowed_lateness_ms = lateness_ms;
        self
    }

    pub fn with_drop_late_elements(mut self, drop: bool) -> Self {
        self.config.window.drop_late_elements = drop;
        self
    }

    /// Fail the run on watermark regressions instead of ignoring them
    pub fn with_strict_watermarks(mut self, strict: bool) -> Self {
        self.config.watermark.strict = strict;
        self
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.config.watermark.tick_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Bound the firing rounds per watermark advance
    pub fn with_max_fire_rounds(mut self, rounds: usize) -> Self {
        self.config.scheduler.max_fire_rounds = rounds;
        self
    }

    pub fn with_max_run_duration(mut self, duration: Duration) -> Self {
        self.config.scheduler.max_run_duration_ms = Some(duration.as_millis() as u64);
        self
    }

    /// Store state in `backend` instead of a fresh in-memory backend
    pub fn with_state_backend(mut self, backend: Arc<dyn StateBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Collect output into an existing collector
    pub fn with_output(mut self, output: OutputCollector<O>) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_function<F>(self, function: F) -> Self
    where
        F: KeyedProcessFn<K, V, O> + 'static,
    {
        self.with_function_arc(Arc::new(function))
    }

    pub fn with_function_arc(mut self, function: Arc<dyn KeyedProcessFn<K, V, O>>) -> Self {
        self.function = Some(function);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validate the configuration and build the executor
    pub fn build(self) -> Result<KeyedExecutor<K, V, O>> {
        self.config.validate()?;

        let function = self
            .function
            .ok_or_else(|| EngineError::configuration("no keyed function configured"))?;
        let store = match self.backend {
            Some(backend) => KeyedStateStore::new(backend),
            None => KeyedStateStore::in_memory(),
        };
        let output = self.output.unwrap_or_default();

        Ok(KeyedExecutor::new(self.config, function, store, output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::KV;
    use crate::scenario::EventTimeFn;
    use crate::state::MemoryStateBackend;

    type Builder = ExecutorBuilder<String, i64, KV<String, i64>>;

    #[test]
    fn test_builder_applies_settings() {
        let builder = Builder::new()
            .with_parallelism(3)
            .with_buffer_size(64)
            .with_tumbling_window(10_000)
            .with_allowed_lateness(500)
            .with_drop_late_elements(true)
            .with_strict_watermarks(true)
            .with_max_fire_rounds(5)
            .with_max_run_duration(Duration::from_secs(30));

        let config = builder.config();
        assert_eq!(config.parallelism, 3);
        assert_eq!(config.buffer_size, 64);
        assert_eq!(config.window.size_ms, Some(10_000));
        assert_eq!(config.window.allowed_lateness_ms, 500);
        assert!(config.window.drop_late_elements);
        assert!(config.watermark.strict);
        assert_eq!(config.scheduler.max_fire_rounds, 5);
        assert_eq!(config.scheduler.max_run_duration_ms, Some(30_000));
    }

    #[test]
    fn test_with_window_replaces_lateness_settings() {
        let builder = Builder::new()
            .with_tumbling_window(1_000)
            .with_allowed_lateness(200)
            .with_window(WindowConfig::global());

        assert_eq!(builder.config().window, WindowConfig::global());
    }

    #[test]
    fn test_build_requires_function() {
        assert!(Builder::new().build().is_err());
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let result = Builder::new()
            .with_parallelism(0)
            .with_function(EventTimeFn::default())
            .build();
        assert!(matches!(result, Err(EngineError::Configuration { .. })));
    }

    #[tokio::test]
    async fn test_build_with_shared_backend_and_output() {
        let backend = Arc::new(MemoryStateBackend::new());
        let output = OutputCollector::new();

        let executor = Builder::new()
            .with_state_backend(backend.clone())
            .with_output(output.clone())
            .with_function(EventTimeFn::default())
            .build()
            .unwrap();

        executor.state().write("k", "MyKey", "k").await.unwrap();
        assert_eq!(backend.stats().put_count, 1);
        assert!(executor.capabilities().declares_family("Callback"));
        assert!(output.is_empty());
    }
}
