//! Keyed executor: element routing, watermark barriers and timer firing
//!
//! The driver pulls events from a source. Elements are windowed, checked for
//! lateness and routed to one of `parallelism` shard workers by key hash, so
//! all callbacks for a key run on one task in arrival order. A watermark
//! advance is broadcast to every shard; each shard fires the timers it owns
//! up to the new watermark and acknowledges, and only then does the driver
//! read the next event. When the source ends the watermark moves to `+∞`.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::capabilities::Capabilities;
use crate::config::{EngineConfig, ExecutionMode};
use crate::context::KeyedContext;
use crate::core::{EngineKey, SourceEvent, TimestampedElement, KV};
use crate::error::{EngineError, Result, TimerError};
use crate::function::KeyedProcessFn;
use crate::output::{OutputCollector, OutputOrigin};
use crate::source::ElementSource;
use crate::state::KeyedStateStore;
use crate::timer::{FiredTimer, FiringLedger, RegistryStats, TimerRegistry, TimerSlot};
use crate::watermark::{Watermark, WatermarkTracker};
use crate::window::{assigner_for, Window, WindowAssigner};

/// Statistics for one run
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ExecutorStats {
    /// Elements handed to `process_element`
    pub elements_processed: u64,

    /// Late elements dropped
    pub elements_dropped: u64,

    /// Late elements seen, dropped or not
    pub late_elements: u64,

    pub timers_set: u64,

    /// Sets that replaced a pending timestamp
    pub timers_overwritten: u64,

    pub timers_cleared: u64,

    pub timers_fired: u64,

    pub outputs_from_elements: u64,

    pub outputs_from_timers: u64,

    pub watermark_advances: u64,

    /// Watermark at the end of the run (ms)
    pub current_watermark: i64,

    /// Non-fatal callback errors
    pub errors: u64,
}

impl ExecutorStats {
    pub fn total_outputs(&self) -> u64 {
        self.outputs_from_elements + self.outputs_from_timers
    }

    /// Elements per second over `elapsed_seconds`
    pub fn elements_per_second(&self, elapsed_seconds: f64) -> f64 {
        if elapsed_seconds > 0.0 {
            self.elements_processed as f64 / elapsed_seconds
        } else {
            0.0
        }
    }
}

/// Why a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    /// The source ended and the final watermark fired every timer
    SourceExhausted,
    /// The stop predicate held after a watermark barrier
    PredicateSatisfied,
    /// [`KeyedExecutor::stop`] was called
    Stopped,
    /// `scheduler.max_run_duration_ms` elapsed
    TimedOut,
}

/// Summary of a finished run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub mode: ExecutionMode,
    pub source: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub completion: CompletionReason,
    /// Timers still pending when the run ended
    pub pending_timers: usize,
    /// Keys whose fired timers are still tracked for duplicate detection
    pub keys_with_firing_history: usize,
    pub stats: ExecutorStats,
}

#[derive(Debug, Default)]
struct Counters {
    elements_processed: AtomicU64,
    elements_dropped: AtomicU64,
    late_elements: AtomicU64,
    timers_set: AtomicU64,
    timers_overwritten: AtomicU64,
    timers_cleared: AtomicU64,
    timers_fired: AtomicU64,
    watermark_advances: AtomicU64,
    current_watermark: AtomicI64,
    errors: AtomicU64,
}

impl Counters {
    fn new() -> Self {
        let counters = Self::default();
        counters
            .current_watermark
            .store(Watermark::min().timestamp, Ordering::Relaxed);
        counters
    }

    fn reset(&self) {
        for counter in [
            &self.elements_processed,
            &self.elements_dropped,
            &self.late_elements,
            &self.timers_set,
            &self.timers_overwritten,
            &self.timers_cleared,
            &self.timers_fired,
            &self.watermark_advances,
            &self.errors,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.current_watermark
            .store(Watermark::min().timestamp, Ordering::Relaxed);
    }

    fn add_registry_delta(&self, now: RegistryStats, before: RegistryStats) {
        self.timers_set
            .fetch_add(now.set - before.set, Ordering::Relaxed);
        self.timers_overwritten
            .fetch_add(now.overwritten - before.overwritten, Ordering::Relaxed);
        self.timers_cleared
            .fetch_add(now.cleared - before.cleared, Ordering::Relaxed);
    }

    fn snapshot<O>(&self, output: &OutputCollector<O>) -> ExecutorStats {
        ExecutorStats {
            elements_processed: self.elements_processed.load(Ordering::Relaxed),
            elements_dropped: self.elements_dropped.load(Ordering::Relaxed),
            late_elements: self.late_elements.load(Ordering::Relaxed),
            timers_set: self.timers_set.load(Ordering::Relaxed),
            timers_overwritten: self.timers_overwritten.load(Ordering::Relaxed),
            timers_cleared: self.timers_cleared.load(Ordering::Relaxed),
            timers_fired: self.timers_fired.load(Ordering::Relaxed),
            outputs_from_elements: output.from_elements(),
            outputs_from_timers: output.from_timers(),
            watermark_advances: self.watermark_advances.load(Ordering::Relaxed),
            current_watermark: self.current_watermark.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Result of firing timers on one shard for one watermark
#[derive(Debug, Clone, Copy, Default)]
struct FiringReport {
    fired: u64,
    failed: u64,
    rounds: usize,
}

enum ShardCommand<K, V> {
    Element {
        element: TimestampedElement<K, V>,
        window: Window,
    },
    AdvanceWatermark {
        watermark: Watermark,
        ack: oneshot::Sender<FiringReport>,
    },
}

/// What a shard hands back when it stops
#[derive(Debug, Default)]
struct ShardSummary {
    pending_timers: usize,
    /// Keys whose firing history is still tracked
    ledger_keys: usize,
}

struct ShardHandle<K, V> {
    tx: mpsc::Sender<ShardCommand<K, V>>,
    handle: JoinHandle<Result<ShardSummary>>,
}

/// Worker owning the timers of the keys routed to it
struct ShardWorker<K: EngineKey, V, O> {
    id: usize,
    function: Arc<dyn KeyedProcessFn<K, V, O>>,
    capabilities: Arc<Capabilities>,
    store: KeyedStateStore,
    output: OutputCollector<O>,
    counters: Arc<Counters>,
    running: Arc<AtomicU64>,
    registry: TimerRegistry<K>,
    ledger: FiringLedger<K>,
    watermark: Watermark,
    max_fire_rounds: usize,
    published: RegistryStats,
}

impl<K, V, O> ShardWorker<K, V, O>
where
    K: EngineKey,
    V: Send + 'static,
    O: Send + Sync + 'static,
{
    async fn run(mut self, mut rx: mpsc::Receiver<ShardCommand<K, V>>) -> Result<ShardSummary> {
        debug!(shard = self.id, "Shard worker started");

        while let Some(command) = rx.recv().await {
            if self.running.load(Ordering::Relaxed) == 0 {
                debug!(shard = self.id, "Shard worker stopping");
                break;
            }

            let result = match command {
                ShardCommand::Element { element, window } => {
                    self.process_element(element, window).await
                }
                ShardCommand::AdvanceWatermark { watermark, ack } => {
                    match self.advance_watermark(watermark).await {
                        Ok(report) => {
                            // The driver may have gone away after a failure elsewhere
                            let _ = ack.send(report);
                            Ok(())
                        }
                        Err(e) => Err(e),
                    }
                }
            };
            self.publish_registry_stats();

            if let Err(e) = result {
                if e.is_fatal() {
                    error!(shard = self.id, error = %e, "Fatal error, aborting run");
                    self.running.store(0, Ordering::Relaxed);
                    return Err(e);
                }
                error!(shard = self.id, error = %e, "Callback failed");
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
            }
        }

        debug!(
            shard = self.id,
            pending_timers = self.registry.len(),
            ledger_keys = self.ledger.tracked_keys(),
            "Shard worker finished"
        );
        Ok(ShardSummary {
            pending_timers: self.registry.len(),
            ledger_keys: self.ledger.tracked_keys(),
        })
    }

    fn publish_registry_stats(&mut self) {
        let now = self.registry.stats();
        if now != self.published {
            self.counters.add_registry_delta(now, self.published);
            self.published = now;
        }
    }

    async fn process_element(
        &mut self,
        element: TimestampedElement<K, V>,
        window: Window,
    ) -> Result<()> {
        trace!(shard = self.id, key = %element.key, timestamp = element.timestamp, "Processing element");

        let mut ctx = KeyedContext::new(
            &element.key,
            &window,
            element.timestamp,
            self.watermark,
            &self.store,
            &mut self.registry,
            &self.capabilities,
        );
        self.function
            .process_element(&mut ctx, element.value)
            .await?;
        let cleared = ctx.cleared_state();
        let emitted = ctx.into_emitted();

        self.counters
            .elements_processed
            .fetch_add(1, Ordering::Relaxed);
        self.output.extend(OutputOrigin::Element, emitted);

        if cleared {
            self.release_if_stateless(&element.key).await?;
        }
        Ok(())
    }

    /// Fire every timer at or before `watermark`, including timers that
    /// callbacks re-arm at or before it
    async fn advance_watermark(&mut self, watermark: Watermark) -> Result<FiringReport> {
        self.watermark = watermark;
        let mut report = FiringReport::default();

        loop {
            let eligible = self.registry.take_eligible(watermark);
            let Some((first_key, _)) = eligible.first() else {
                break;
            };

            report.rounds += 1;
            if report.rounds > self.max_fire_rounds {
                return Err(EngineError::contract_violation(
                    first_key,
                    format!(
                        "timers still eligible at {} after {} firing rounds; a callback keeps re-arming at or before the watermark",
                        watermark, self.max_fire_rounds
                    ),
                ));
            }

            // Every eligible timer is already out of the registry, so a
            // failed callback must not stop the rest of the batch
            for (key, timer) in eligible {
                let slot = TimerSlot::new(key.clone(), timer.family.as_str(), timer.tag.as_str());
                match self.fire(key, timer).await {
                    Ok(()) => report.fired += 1,
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        error!(shard = self.id, timer = %slot, error = %e, "Timer callback failed");
                        self.counters.errors.fetch_add(1, Ordering::Relaxed);
                        report.failed += 1;
                    }
                }
            }
        }

        if report.fired > 0 || report.failed > 0 {
            debug!(
                shard = self.id,
                watermark = %watermark,
                fired = report.fired,
                failed = report.failed,
                rounds = report.rounds,
                "Fired timers"
            );
        }
        Ok(report)
    }

    async fn fire(&mut self, key: K, timer: FiredTimer) -> Result<()> {
        if !self.capabilities.declares_family(&timer.family) {
            return Err(TimerError::UnknownTimer {
                key: key.to_string(),
                family: timer.family,
                tag: timer.tag,
            }
            .into());
        }
        self.ledger.record(&key, &timer)?;

        trace!(
            shard = self.id,
            key = %key,
            family = %timer.family,
            tag = %timer.tag,
            timestamp = timer.timestamp,
            generation = timer.generation,
            "Firing timer"
        );

        self.registry.begin_firing(&key, &timer.family, &timer.tag);
        let mut ctx = KeyedContext::new(
            &key,
            &timer.window,
            timer.timestamp,
            self.watermark,
            &self.store,
            &mut self.registry,
            &self.capabilities,
        );
        let result = self.function.on_timer(&mut ctx, &timer).await;
        let cleared = ctx.cleared_state();
        let emitted = ctx.into_emitted();
        self.registry.end_firing();
        result?;

        self.counters.timers_fired.fetch_add(1, Ordering::Relaxed);
        self.output.extend(OutputOrigin::Timer, emitted);

        if cleared {
            self.release_if_stateless(&key).await?;
        }
        Ok(())
    }

    /// Forget the firing history of a key left without any state
    async fn release_if_stateless(&mut self, key: &K) -> Result<()> {
        if self.store.cell_names(key).await?.is_empty() {
            let slots = self.ledger.forget_key(key);
            trace!(shard = self.id, key = %key, slots, "Released firing history");
        }
        Ok(())
    }
}

/// Runs a [`KeyedProcessFn`] over keyed elements
///
/// Built with [`ExecutorBuilder`](crate::builder::ExecutorBuilder).
pub struct KeyedExecutor<K: EngineKey, V, O> {
    config: EngineConfig,
    function: Arc<dyn KeyedProcessFn<K, V, O>>,
    capabilities: Arc<Capabilities>,
    store: KeyedStateStore,
    output: OutputCollector<O>,
    assigner: Arc<dyn WindowAssigner>,
    counters: Arc<Counters>,
    running: Arc<AtomicU64>,
}

impl<K, V, O> KeyedExecutor<K, V, O>
where
    K: EngineKey,
    V: Clone + Send + Sync + 'static,
    O: Send + Sync + 'static,
{
    pub(crate) fn new(
        config: EngineConfig,
        function: Arc<dyn KeyedProcessFn<K, V, O>>,
        store: KeyedStateStore,
        output: OutputCollector<O>,
    ) -> Self {
        let capabilities = Arc::new(function.capabilities());
        let assigner = assigner_for(&config.window);
        Self {
            config,
            function,
            capabilities,
            store,
            output,
            assigner,
            counters: Arc::new(Counters::new()),
            running: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Collected outputs; clones share storage
    pub fn output(&self) -> &OutputCollector<O> {
        &self.output
    }

    pub fn state(&self) -> &KeyedStateStore {
        &self.store
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Live statistics of the current or last run
    pub fn stats(&self) -> ExecutorStats {
        self.counters.snapshot(&self.output)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed) == 1
    }

    /// Ask a running executor to stop after the current event
    pub fn stop(&self) {
        info!("Stopping keyed executor");
        self.running.store(0, Ordering::Relaxed);
    }

    /// Shard a key is routed to
    pub fn shard_for(&self, key: &K) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.config.parallelism as u64) as usize
    }

    /// Run until the source is exhausted
    pub async fn run<S>(&self, source: S) -> Result<RunReport>
    where
        S: ElementSource<KV<K, V>>,
    {
        self.run_until(source, |_| false).await
    }

    /// Run until the source is exhausted or `stop` holds after a watermark
    /// barrier
    ///
    /// Each run starts with zeroed statistics and an empty output collector.
    /// Keyed state in the store carries over between runs.
    pub async fn run_until<S, P>(&self, mut source: S, mut stop: P) -> Result<RunReport>
    where
        S: ElementSource<KV<K, V>>,
        P: FnMut(&OutputCollector<O>) -> bool + Send,
    {
        self.config.validate()?;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let started = Instant::now();

        if source.is_bounded() != (self.config.mode == ExecutionMode::Bounded) {
            warn!(
                mode = %self.config.mode,
                source = source.name(),
                bounded_source = source.is_bounded(),
                "Source boundedness does not match execution mode"
            );
        }

        info!(
            run_id = %run_id,
            mode = %self.config.mode,
            function = self.function.name(),
            source = source.name(),
            parallelism = self.config.parallelism,
            "Starting keyed executor"
        );

        self.counters.reset();
        self.output.clear();
        self.running.store(1, Ordering::Relaxed);
        let shards = self.spawn_shards();
        let mut tracker = WatermarkTracker::new(self.config.watermark.strict);

        let driven = {
            let drive = self.drive(&mut source, &shards, &mut tracker, &mut stop);
            match self.config.scheduler.max_run_duration() {
                Some(limit) => match tokio::time::timeout(limit, drive).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(limit_ms = limit.as_millis() as u64, "Run timed out");
                        Ok(CompletionReason::TimedOut)
                    }
                },
                None => drive.await,
            }
        };

        if driven.is_err() {
            self.running.store(0, Ordering::Relaxed);
        }
        let finished = self.join_shards(shards).await;
        self.running.store(0, Ordering::Relaxed);

        // A shard's own error explains a failed barrier better than the
        // driver's closed-channel error
        let (completion, summary) = match (driven, finished) {
            (_, Err(shard_err)) => {
                error!(run_id = %run_id, error = %shard_err, "Run aborted by shard");
                return Err(shard_err);
            }
            (Err(e), Ok(_)) => {
                error!(run_id = %run_id, error = %e, "Run failed");
                return Err(e);
            }
            (Ok(completion), Ok(summary)) => (completion, summary),
        };

        let stats = self.stats();
        let report = RunReport {
            run_id,
            mode: self.config.mode,
            source: source.name().to_string(),
            started_at,
            duration_ms: started.elapsed().as_millis() as u64,
            completion,
            pending_timers: summary.pending_timers,
            keys_with_firing_history: summary.ledger_keys,
            stats,
        };

        info!(
            run_id = %run_id,
            completion = ?report.completion,
            elements = report.stats.elements_processed,
            timers_fired = report.stats.timers_fired,
            outputs = report.stats.total_outputs(),
            duration_ms = report.duration_ms,
            "Keyed executor finished"
        );
        Ok(report)
    }

    fn spawn_shards(&self) -> Vec<ShardHandle<K, V>> {
        (0..self.config.parallelism)
            .map(|id| {
                let (tx, rx) = mpsc::channel(self.config.buffer_size);
                let worker = ShardWorker {
                    id,
                    function: Arc::clone(&self.function),
                    capabilities: Arc::clone(&self.capabilities),
                    store: self.store.clone(),
                    output: self.output.clone(),
                    counters: Arc::clone(&self.counters),
                    running: Arc::clone(&self.running),
                    registry: TimerRegistry::new(),
                    ledger: FiringLedger::new(),
                    watermark: Watermark::min(),
                    max_fire_rounds: self.config.scheduler.max_fire_rounds,
                    published: RegistryStats::default(),
                };
                ShardHandle {
                    tx,
                    handle: tokio::spawn(worker.run(rx)),
                }
            })
            .collect()
    }

    async fn join_shards(&self, shards: Vec<ShardHandle<K, V>>) -> Result<ShardSummary> {
        let mut total = ShardSummary::default();
        let mut first_error = None;

        for ShardHandle { tx, handle } in shards {
            drop(tx);
            match handle.await {
                Ok(Ok(summary)) => {
                    total.pending_timers += summary.pending_timers;
                    total.ledger_keys += summary.ledger_keys;
                }
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(join_err) => {
                    first_error.get_or_insert(EngineError::execution(format!(
                        "shard task failed: {}",
                        join_err
                    )));
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(total),
        }
    }

    async fn drive<S, P>(
        &self,
        source: &mut S,
        shards: &[ShardHandle<K, V>],
        tracker: &mut WatermarkTracker,
        stop: &mut P,
    ) -> Result<CompletionReason>
    where
        S: ElementSource<KV<K, V>>,
        P: FnMut(&OutputCollector<O>) -> bool + Send,
    {
        loop {
            if !self.is_running() {
                return Ok(CompletionReason::Stopped);
            }

            match source.next_event().await {
                Some(SourceEvent::Element {
                    value,
                    timestamp,
                    window,
                }) => {
                    let element = TimestampedElement {
                        key: value.key,
                        value: value.value,
                        timestamp,
                        window,
                    };
                    self.dispatch(element, tracker, shards).await?;
                }
                Some(SourceEvent::Watermark(candidate)) => {
                    if let Some(watermark) = tracker.advance(candidate)? {
                        self.barrier(watermark, shards).await?;
                        if stop(&self.output) {
                            info!(watermark = %watermark, "Stop condition reached");
                            return Ok(CompletionReason::PredicateSatisfied);
                        }
                    }
                }
                None => {
                    if let Some(watermark) = tracker.advance(Watermark::max())? {
                        self.barrier(watermark, shards).await?;
                    }
                    return Ok(CompletionReason::SourceExhausted);
                }
            }
        }
    }

    async fn dispatch(
        &self,
        element: TimestampedElement<K, V>,
        tracker: &WatermarkTracker,
        shards: &[ShardHandle<K, V>],
    ) -> Result<()> {
        let watermark = tracker.current();
        let windows = match &element.window {
            Some(window) => vec![window.clone()],
            None => self.assigner.assign_windows(element.timestamp),
        };
        let shard = self.shard_for(&element.key);
        let window_config = &self.config.window;

        for window in windows {
            let expires_at = window
                .max_timestamp()
                .saturating_add(window_config.allowed_lateness_ms as i64);
            if !watermark.is_min() && expires_at < watermark.timestamp {
                self.counters.late_elements.fetch_add(1, Ordering::Relaxed);
                let lateness_ms = tracker.lateness(element.timestamp);
                if window_config.drop_late_elements {
                    warn!(
                        key = %element.key,
                        window = %window,
                        watermark = %watermark,
                        lateness_ms,
                        "Dropping late element"
                    );
                    self.counters
                        .elements_dropped
                        .fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                warn!(
                    key = %element.key,
                    window = %window,
                    watermark = %watermark,
                    lateness_ms,
                    "Processing late element"
                );
            }

            let command = ShardCommand::Element {
                element: element.clone(),
                window,
            };
            shards[shard].tx.send(command).await.map_err(|_| {
                EngineError::execution(format!("shard {} stopped accepting elements", shard))
            })?;
        }
        Ok(())
    }

    /// Advance every shard to `watermark` and wait until each has fired its
    /// eligible timers
    async fn barrier(&self, watermark: Watermark, shards: &[ShardHandle<K, V>]) -> Result<()> {
        let mut acks = Vec::with_capacity(shards.len());
        for (id, shard) in shards.iter().enumerate() {
            let (ack, done) = oneshot::channel();
            shard
                .tx
                .send(ShardCommand::AdvanceWatermark { watermark, ack })
                .await
                .map_err(|_| EngineError::execution(format!("shard {} stopped", id)))?;
            acks.push(done);
        }

        let mut fired = 0;
        let mut failed = 0;
        let mut rounds = 0;
        for (id, done) in acks.into_iter().enumerate() {
            let report = done.await.map_err(|_| {
                EngineError::execution(format!("shard {} failed before acknowledging {}", id, watermark))
            })?;
            fired += report.fired;
            failed += report.failed;
            rounds = rounds.max(report.rounds);
        }

        self.counters
            .watermark_advances
            .fetch_add(1, Ordering::Relaxed);
        self.counters
            .current_watermark
            .store(watermark.timestamp, Ordering::Relaxed);
        debug!(watermark = %watermark, fired, failed, rounds, "Watermark barrier complete");
        Ok(())
    }
}

impl<K: EngineKey, V, O> Drop for KeyedExecutor<K, V, O> {
    fn drop(&mut self) {
        self.running.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ExecutorBuilder;
    use crate::source::VecSource;
    use async_trait::async_trait;

    /// Counts elements per key and emits the count when the window closes
    struct CountAtWindowEnd;

    #[async_trait]
    impl KeyedProcessFn<String, i64, KV<String, i64>> for CountAtWindowEnd {
        fn capabilities(&self) -> Capabilities {
            Capabilities::new()
                .with_timer_family("Flush")
                .with_state_cell("count")
        }

        async fn process_element(
            &self,
            ctx: &mut KeyedContext<'_, String, KV<String, i64>>,
            _value: i64,
        ) -> Result<()> {
            let count: i64 = ctx.read_state("count").await?.unwrap_or(0);
            ctx.write_state("count", &(count + 1)).await?;
            let end = ctx.window().max_timestamp();
            ctx.set_timer("Flush", "", end)?;
            Ok(())
        }

        async fn on_timer(
            &self,
            ctx: &mut KeyedContext<'_, String, KV<String, i64>>,
            _timer: &FiredTimer,
        ) -> Result<()> {
            let count: i64 = ctx.require_state("count").await?;
            ctx.clear_state("count").await?;
            let key = ctx.key().clone();
            ctx.emit(KV::new(key, count));
            Ok(())
        }
    }

    fn executor(parallelism: usize) -> KeyedExecutor<String, i64, KV<String, i64>> {
        ExecutorBuilder::new()
            .with_parallelism(parallelism)
            .with_tumbling_window(1_000)
            .with_function(CountAtWindowEnd)
            .build()
            .unwrap()
    }

    fn kv(key: &str, ts: i64) -> SourceEvent<KV<String, i64>> {
        SourceEvent::element(KV::new(key.to_string(), 1), ts)
    }

    #[tokio::test]
    async fn test_timers_fire_when_watermark_passes_window_end() {
        let executor = executor(2);
        let source = VecSource::new(vec![
            kv("a", 100),
            kv("a", 200),
            kv("b", 300),
            SourceEvent::Watermark(Watermark::new(998)),
            SourceEvent::Watermark(Watermark::new(999)),
            kv("a", 1_500),
        ]);

        let report = executor.run(source).await.unwrap();

        let mut records = executor.output().records();
        records.sort();
        assert_eq!(
            records,
            vec![
                KV::new("a".to_string(), 1),
                KV::new("a".to_string(), 2),
                KV::new("b".to_string(), 1),
            ]
        );
        assert_eq!(report.completion, CompletionReason::SourceExhausted);
        assert_eq!(report.stats.elements_processed, 4);
        assert_eq!(report.stats.timers_fired, 3);
        assert_eq!(report.stats.timers_overwritten, 1);
        assert_eq!(report.stats.watermark_advances, 3);
        assert_eq!(report.stats.current_watermark, i64::MAX);
        assert_eq!(report.pending_timers, 0);
    }

    #[tokio::test]
    async fn test_late_elements_dropped_when_configured() {
        let executor: KeyedExecutor<String, i64, KV<String, i64>> = ExecutorBuilder::new()
            .with_tumbling_window(1_000)
            .with_drop_late_elements(true)
            .with_function(CountAtWindowEnd)
            .build()
            .unwrap();

        let source = VecSource::new(vec![
            SourceEvent::Watermark(Watermark::new(5_000)),
            kv("a", 100),
            kv("a", 5_100),
        ]);
        let report = executor.run(source).await.unwrap();

        assert_eq!(report.stats.elements_dropped, 1);
        assert_eq!(report.stats.late_elements, 1);
        assert_eq!(executor.output().records(), vec![KV::new("a".to_string(), 1)]);
    }

    #[tokio::test]
    async fn test_late_elements_processed_by_default() {
        let executor = executor(1);
        let source = VecSource::new(vec![
            SourceEvent::Watermark(Watermark::new(5_000)),
            kv("a", 100),
        ]);
        let report = executor.run(source).await.unwrap();

        assert_eq!(report.stats.late_elements, 1);
        assert_eq!(report.stats.elements_dropped, 0);
        assert_eq!(executor.output().len(), 1);
    }

    #[tokio::test]
    async fn test_stop_predicate() {
        let executor = executor(2);
        let source = VecSource::new(vec![
            kv("a", 100),
            SourceEvent::Watermark(Watermark::new(1_000)),
            kv("a", 1_100),
            SourceEvent::Watermark(Watermark::new(2_000)),
        ]);

        let report = executor
            .run_until(source, |output| !output.is_empty())
            .await
            .unwrap();

        assert_eq!(report.completion, CompletionReason::PredicateSatisfied);
        assert_eq!(executor.output().len(), 1);
        assert_eq!(report.pending_timers, 0);
        assert!(!executor.is_running());
    }

    #[tokio::test]
    async fn test_strict_watermark_regression_fails_run() {
        let executor: KeyedExecutor<String, i64, KV<String, i64>> = ExecutorBuilder::new()
            .with_strict_watermarks(true)
            .with_function(CountAtWindowEnd)
            .build()
            .unwrap();

        let source = VecSource::new(vec![
            SourceEvent::Watermark(Watermark::new(2_000)),
            SourceEvent::Watermark(Watermark::new(1_000)),
        ]);
        let err = executor.run(source).await.unwrap_err();
        assert!(matches!(err, EngineError::Watermark(_)));
    }

    #[test]
    fn test_elements_per_second() {
        let stats = ExecutorStats {
            elements_processed: 750,
            ..Default::default()
        };
        assert_eq!(stats.elements_per_second(2.5), 300.0);
        assert_eq!(stats.elements_per_second(0.0), 0.0);
    }

    #[test]
    fn test_key_routing_is_stable() {
        let executor = executor(4);
        let key = "42".to_string();
        let shard = executor.shard_for(&key);
        assert!(shard < 4);
        assert_eq!(executor.shard_for(&key), shard);
    }
}
