//! Configuration types for the engine
//!
//! [`EngineConfig`] is loaded from an optional YAML file merged with
//! `KEYED_TIMERS_`-prefixed environment variables (nested fields use `__`,
//! e.g. `KEYED_TIMERS_WINDOW__SIZE_MS=10000`).

use crate::error::{EngineError, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "KEYED_TIMERS_";

/// Main engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Bounded (batch) or unbounded (streaming) execution
    #[serde(default)]
    pub mode: ExecutionMode,

    /// Number of shard workers; each key is pinned to one shard
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    /// Capacity of each shard's command channel
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Window assignment for elements that arrive without a window
    #[serde(default)]
    pub window: WindowConfig,

    /// Watermark handling
    #[serde(default)]
    pub watermark: WatermarkConfig,

    /// Timer scheduling limits
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::default(),
            parallelism: default_parallelism(),
            buffer_size: default_buffer_size(),
            window: WindowConfig::default(),
            watermark: WatermarkConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Layered configuration source: defaults, then YAML file, then environment
    pub fn figment(config_path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(EngineConfig::default()));

        if let Some(path) = config_path {
            figment = figment.merge(Yaml::file(path));
        }

        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load configuration from file and environment, then validate it
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        Self::from_figment(Self::figment(config_path))
    }

    /// Extract and validate configuration from a prepared figment
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: EngineConfig = figment.extract().map_err(|e| EngineError::Configuration {
            source: Box::new(e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.window.validate()?;
        self.watermark.validate()?;
        self.scheduler.validate()?;

        if self.parallelism == 0 {
            return Err(EngineError::configuration(
                "parallelism must be greater than 0",
            ));
        }

        if self.buffer_size == 0 {
            return Err(EngineError::configuration(
                "buffer_size must be greater than 0",
            ));
        }

        Ok(())
    }
}

/// Execution mode
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Finite input; the watermark jumps to `+∞` once input is exhausted
    #[default]
    Bounded,
    /// Continuous input; the watermark is driven by periodic ticks
    Unbounded,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::Bounded => write!(f, "bounded"),
            ExecutionMode::Unbounded => write!(f, "unbounded"),
        }
    }
}

impl std::str::FromStr for ExecutionMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "bounded" | "batch" => Ok(ExecutionMode::Bounded),
            "unbounded" | "streaming" => Ok(ExecutionMode::Unbounded),
            other => Err(EngineError::configuration(format!(
                "unknown execution mode '{}'",
                other
            ))),
        }
    }
}

/// Window configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WindowConfig {
    /// Type of window
    #[serde(default)]
    pub window_type: WindowType,

    /// Window size in milliseconds (tumbling windows)
    #[serde(default)]
    pub size_ms: Option<u64>,

    /// How long after a window's end its elements are still accepted
    #[serde(default)]
    pub allowed_lateness_ms: u64,

    /// Drop elements whose window has passed the watermark by more than the
    /// allowed lateness instead of processing them
    #[serde(default)]
    pub drop_late_elements: bool,
}

/// Type of windowing strategy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum WindowType {
    /// One window spanning all of event time
    #[default]
    Global,
    /// Fixed-size non-overlapping windows
    Tumbling,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self::global()
    }
}

impl WindowConfig {
    /// Global window configuration
    pub fn global() -> Self {
        Self {
            window_type: WindowType::Global,
            size_ms: None,
            allowed_lateness_ms: 0,
            drop_late_elements: false,
        }
    }

    /// Create a tumbling window configuration
    pub fn tumbling(size_ms: u64) -> Self {
        Self {
            window_type: WindowType::Tumbling,
            size_ms: Some(size_ms),
            ..Self::global()
        }
    }

    /// Validate window configuration
    pub fn validate(&self) -> Result<()> {
        if self.window_type == WindowType::Tumbling {
            match self.size_ms {
                Some(0) => {
                    return Err(EngineError::configuration(
                        "tumbling window size must be greater than 0",
                    ))
                }
                None => {
                    return Err(EngineError::configuration(
                        "tumbling window requires size_ms",
                    ))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

/// Watermark configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatermarkConfig {
    /// Reject watermark regressions instead of ignoring them
    #[serde(default)]
    pub strict: bool,

    /// Wall-clock pacing between periodic source ticks (milliseconds)
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            strict: false,
            tick_interval_ms: default_tick_interval(),
        }
    }
}

impl WatermarkConfig {
    /// Validate watermark configuration
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            return Err(EngineError::configuration(
                "watermark tick_interval_ms must be greater than 0",
            ));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Timer scheduling configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerConfig {
    /// Maximum firing rounds per watermark advance; a callback that keeps
    /// re-arming at or before the watermark hits this limit
    #[serde(default = "default_max_fire_rounds")]
    pub max_fire_rounds: usize,

    /// Abort the run after this long (milliseconds); unlimited when unset
    #[serde(default)]
    pub max_run_duration_ms: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_fire_rounds: default_max_fire_rounds(),
            max_run_duration_ms: None,
        }
    }
}

impl SchedulerConfig {
    /// Validate scheduler configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_fire_rounds == 0 {
            return Err(EngineError::configuration(
                "scheduler max_fire_rounds must be greater than 0",
            ));
        }
        if self.max_run_duration_ms == Some(0) {
            return Err(EngineError::configuration(
                "scheduler max_run_duration_ms must be greater than 0",
            ));
        }
        Ok(())
    }

    pub fn max_run_duration(&self) -> Option<Duration> {
        self.max_run_duration_ms.map(Duration::from_millis)
    }
}

fn default_parallelism() -> usize {
    4
}

fn default_buffer_size() -> usize {
    1024
}

fn default_tick_interval() -> u64 {
    1_000
}

fn default_max_fire_rounds() -> usize {
    1_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.mode, ExecutionMode::Bounded);
        assert_eq!(config.window.window_type, WindowType::Global);
    }

    #[test]
    fn test_invalid_parallelism() {
        let config = EngineConfig {
            parallelism: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tumbling_requires_size() {
        let mut window = WindowConfig::tumbling(10_000);
        assert!(window.validate().is_ok());

        window.size_ms = None;
        assert!(window.validate().is_err());

        window.size_ms = Some(0);
        assert!(window.validate().is_err());
    }

    #[test]
    fn test_scheduler_validation() {
        let scheduler = SchedulerConfig {
            max_fire_rounds: 0,
            ..Default::default()
        };
        assert!(scheduler.validate().is_err());

        let scheduler = SchedulerConfig {
            max_run_duration_ms: Some(0),
            ..Default::default()
        };
        assert!(scheduler.validate().is_err());
    }

    #[test]
    fn test_execution_mode_parsing() {
        assert_eq!("bounded".parse::<ExecutionMode>().unwrap(), ExecutionMode::Bounded);
        assert_eq!("Streaming".parse::<ExecutionMode>().unwrap(), ExecutionMode::Unbounded);
        assert!("sideways".parse::<ExecutionMode>().is_err());
        assert_eq!(ExecutionMode::Unbounded.to_string(), "unbounded");
    }

    #[test]
    fn test_load_from_yaml_layer() {
        let figment = Figment::from(Serialized::defaults(EngineConfig::default())).merge(
            Yaml::string(
                r#"
mode: unbounded
parallelism: 8
window:
  window_type: tumbling
  size_ms: 10000
scheduler:
  max_fire_rounds: 16
"#,
            ),
        );

        let config = EngineConfig::from_figment(figment).unwrap();
        assert_eq!(config.mode, ExecutionMode::Unbounded);
        assert_eq!(config.parallelism, 8);
        assert_eq!(config.window, WindowConfig::tumbling(10_000));
        assert_eq!(config.scheduler.max_fire_rounds, 16);
        assert_eq!(config.buffer_size, 1024);
    }

    #[test]
    fn test_load_rejects_invalid_layer() {
        let figment = Figment::from(Serialized::defaults(EngineConfig::default()))
            .merge(Yaml::string("parallelism: 0"));
        assert!(EngineConfig::from_figment(figment).is_err());
    }
}
