//! Event-time timer scenario
//!
//! Every key receives the same number of duplicate elements. Each element
//! emits `value + offset`, stores the key in the `MyKey` cell and re-arms the
//! `Callback` timer at the end of its window. The timer must fire exactly
//! once per key and emit `(key, timer_output)` from the stored state.
//!
//! With the defaults (50 keys, 15 duplicates) a correct run produces 750
//! element outputs and 50 timer outputs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::builder::ExecutorBuilder;
use crate::capabilities::Capabilities;
use crate::config::{EngineConfig, ExecutionMode};
use crate::context::KeyedContext;
use crate::core::KV;
use crate::error::{Result, TimerError};
use crate::executor::{KeyedExecutor, RunReport};
use crate::function::KeyedProcessFn;
use crate::source::{BoundedImpulse, FlatMapSource, Impulse, PeriodicImpulse};
use crate::state::ValueState;
use crate::timer::{EventTimeTimer, FiredTimer, DEFAULT_TAG};
use crate::verify::MultisetComparison;

pub const DEFAULT_OFFSET: i64 = 5000;
pub const DEFAULT_TIMER_OUTPUT: i64 = 4093;
pub const CALLBACK_FAMILY: &str = "Callback";
pub const MY_KEY_CELL: &str = "MyKey";

/// Event time covered by the unbounded impulse
pub const UNBOUNDED_RANGE: Duration = Duration::from_secs(10);

pub type Record = KV<String, i64>;

/// Shape of the scenario input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioParams {
    pub num_keys: usize,
    pub duplicates: usize,
    pub offset: i64,
    pub timer_output: i64,
}

impl Default for ScenarioParams {
    fn default() -> Self {
        Self {
            num_keys: 50,
            duplicates: 15,
            offset: DEFAULT_OFFSET,
            timer_output: DEFAULT_TIMER_OUTPUT,
        }
    }
}

impl ScenarioParams {
    /// Keys `"0"..num_keys`, each with values `0..duplicates`
    pub fn inputs(&self) -> Vec<Record> {
        (0..self.num_keys)
            .flat_map(|key| {
                (0..self.duplicates as i64).map(move |i| KV::new(key.to_string(), i))
            })
            .collect()
    }

    /// One timer record per key plus `i + offset` per element
    pub fn expected_outputs(&self) -> Vec<Record> {
        let mut expected = Vec::with_capacity(self.num_keys * (self.duplicates + 1));
        for key in 0..self.num_keys {
            let key = key.to_string();
            expected.push(KV::new(key.clone(), self.timer_output));
            for i in 0..self.duplicates as i64 {
                expected.push(KV::new(key.clone(), i + self.offset));
            }
        }
        expected
    }

    pub fn function(&self) -> EventTimeFn {
        EventTimeFn::new(self.offset, self.timer_output)
    }
}

/// Re-arms one event-time timer per element and reads state when it fires
#[derive(Debug, Clone)]
pub struct EventTimeFn {
    callback: EventTimeTimer,
    my_key: ValueState<String>,
    offset: i64,
    timer_output: i64,
}

impl Default for EventTimeFn {
    fn default() -> Self {
        Self::new(DEFAULT_OFFSET, DEFAULT_TIMER_OUTPUT)
    }
}

impl EventTimeFn {
    pub fn new(offset: i64, timer_output: i64) -> Self {
        Self {
            callback: EventTimeTimer::new(CALLBACK_FAMILY),
            my_key: ValueState::new(MY_KEY_CELL),
            offset,
            timer_output,
        }
    }
}

#[async_trait]
impl KeyedProcessFn<String, i64, Record> for EventTimeFn {
    fn name(&self) -> &str {
        "event_time_fn"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::new()
            .with_timer_family(self.callback.family())
            .with_state_cell(self.my_key.name())
    }

    async fn process_element(
        &self,
        ctx: &mut KeyedContext<'_, String, Record>,
        value: i64,
    ) -> Result<()> {
        self.callback.set_at_window_end(ctx)?;
        let key = ctx.key().clone();
        self.my_key.write(ctx, &key).await?;
        ctx.emit(KV::new(key, value + self.offset));
        Ok(())
    }

    async fn on_timer(
        &self,
        ctx: &mut KeyedContext<'_, String, Record>,
        timer: &FiredTimer,
    ) -> Result<()> {
        if !self.callback.matches(timer) || timer.tag != DEFAULT_TAG {
            return Err(TimerError::UnknownTimer {
                key: ctx.key().clone(),
                family: timer.family.clone(),
                tag: timer.tag.clone(),
            }
            .into());
        }

        let stored = self.my_key.read_required(ctx).await?;
        ctx.emit(KV::new(stored, self.timer_output));
        Ok(())
    }
}

type Expand = Box<dyn FnMut(Impulse) -> Vec<Record> + Send>;

/// Scenario input driven by an impulse source
pub type ScenarioSource<S> = FlatMapSource<S, Expand, Impulse, Record>;

fn expand(inputs: Vec<Record>) -> Expand {
    Box::new(move |_| inputs.clone())
}

/// All inputs at the start of the global window, then end of input
pub fn bounded_source(params: &ScenarioParams) -> ScenarioSource<BoundedImpulse> {
    FlatMapSource::new(BoundedImpulse::new(), expand(params.inputs()))
}

/// All inputs on a single periodic impulse at `start`, followed by a tick
/// past `start + 10s`
pub fn unbounded_source(
    params: &ScenarioParams,
    start: DateTime<Utc>,
    pacing: Duration,
) -> ScenarioSource<PeriodicImpulse> {
    let end = start + chrono::Duration::milliseconds(UNBOUNDED_RANGE.as_millis() as i64);
    let impulse = PeriodicImpulse::new(start, end, Duration::ZERO, false).with_pacing(pacing);
    FlatMapSource::new(impulse, expand(params.inputs()))
}

/// Report and verdict of one scenario run
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioOutcome {
    pub params: ScenarioParams,
    pub report: RunReport,
    pub comparison: MultisetComparison<Record>,
}

impl ScenarioOutcome {
    pub fn passed(&self) -> bool {
        self.comparison.passed()
    }
}

/// Run the scenario in `config.mode` and compare the output multiset
///
/// Unbounded runs stop as soon as every expected record was observed.
pub async fn run_scenario(params: ScenarioParams, config: EngineConfig) -> Result<ScenarioOutcome> {
    let expected = params.expected_outputs();
    let expected_len = expected.len();
    let mode = config.mode;
    let pacing = config.watermark.tick_interval();

    let executor: KeyedExecutor<String, i64, Record> = ExecutorBuilder::new()
        .with_config(config)
        .with_function(params.function())
        .build()?;

    let report = match mode {
        ExecutionMode::Bounded => executor.run(bounded_source(&params)).await?,
        ExecutionMode::Unbounded => {
            let source = unbounded_source(&params, Utc::now(), pacing);
            executor
                .run_until(source, |output| output.len() >= expected_len)
                .await?
        }
    };

    let comparison = MultisetComparison::compare(expected, executor.output().records());
    Ok(ScenarioOutcome {
        params,
        report,
        comparison,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_expectations() {
        let params = ScenarioParams::default();
        assert_eq!(params.inputs().len(), 750);

        let expected = params.expected_outputs();
        assert_eq!(expected.len(), 800);
        assert!(expected.contains(&KV::new("49".to_string(), 4093)));
        assert!(expected.contains(&KV::new("0".to_string(), 5014)));
        assert!(!expected.contains(&KV::new("0".to_string(), 5015)));
    }

    #[test]
    fn test_capabilities() {
        let caps = EventTimeFn::default().capabilities();
        assert!(caps.declares_family(CALLBACK_FAMILY));
        assert!(caps.declares_cell(MY_KEY_CELL));
    }

    #[tokio::test]
    async fn test_small_bounded_run() {
        let params = ScenarioParams {
            num_keys: 3,
            duplicates: 4,
            ..Default::default()
        };
        let outcome = run_scenario(params, EngineConfig::default()).await.unwrap();

        assert!(outcome.passed(), "{}", outcome.comparison);
        assert_eq!(outcome.report.stats.timers_fired, 3);
        assert_eq!(outcome.report.stats.timers_overwritten, 9);
    }
}
