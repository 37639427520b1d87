//! Keyed event-time timer and state engine
//!
//! This crate runs a user-supplied [`KeyedProcessFn`] over keyed elements.
//! Per key it provides:
//!
//! - state cells that later element and timer callbacks of the key see
//! - event-time timers that fire once per arm cycle however often they are
//!   re-armed before firing
//! - watermark-driven firing in both bounded and unbounded runs
//!
//! Keys are routed to shard workers so all callbacks for one key are
//! serialized; outputs from every shard are gathered in an
//! [`OutputCollector`].
//!
//! # Example
//!
//! ```rust,no_run
//! use engine::scenario::{self, ScenarioParams};
//! use engine::EngineConfig;
//!
//! # async fn example() -> engine::Result<()> {
//! let outcome = scenario::run_scenario(ScenarioParams::default(), EngineConfig::default()).await?;
//! assert!(outcome.passed());
//! assert_eq!(outcome.report.stats.total_outputs(), 800);
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod capabilities;
pub mod config;
pub mod context;
pub mod core;
pub mod error;
pub mod executor;
pub mod function;
pub mod output;
pub mod scenario;
pub mod source;
pub mod state;
pub mod timer;
pub mod verify;
pub mod watermark;
pub mod window;

pub use crate::core::{EngineKey, SourceEvent, TimestampedElement, KV};

pub use builder::ExecutorBuilder;
pub use capabilities::Capabilities;
pub use config::{
    EngineConfig, ExecutionMode, SchedulerConfig, WatermarkConfig, WindowConfig, WindowType,
};
pub use context::KeyedContext;
pub use error::{
    EngineError, Result, StateError, StateResult, TimerError, TimerResult, WatermarkError,
    WatermarkResult,
};
pub use executor::{CompletionReason, ExecutorStats, KeyedExecutor, RunReport};
pub use function::KeyedProcessFn;
pub use output::{OutputCollector, OutputOrigin};
pub use source::{BoundedImpulse, ElementSource, FlatMapSource, Impulse, PeriodicImpulse, VecSource};
pub use state::{KeyedStateStore, MemoryStateBackend, StateBackend, ValueState};
pub use timer::{
    EventTimeTimer, FiredTimer, FiringLedger, KeyTimerStatus, TimerPhase, TimerRegistry, TimerSlot,
};
pub use verify::{MultisetComparison, Verdict};
pub use watermark::{Watermark, WatermarkTracker};
pub use window::{Window, WindowAssigner, WindowBounds};
