//! Element sources
//!
//! A source yields elements and watermark advances until it is exhausted.
//! The executor moves the watermark to `+∞` once [`ElementSource::next_event`]
//! returns `None`.
//!
//! - [`BoundedImpulse`]: one impulse at the start of the global window
//! - [`PeriodicImpulse`]: impulses at a fixed event-time interval, paced in
//!   wall-clock time, each followed by a watermark
//! - [`FlatMapSource`]: expands every element of an inner source
//! - [`VecSource`]: replays a prepared event list

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, trace};

use crate::core::SourceEvent;
use crate::watermark::Watermark;
use crate::window::Window;

/// Produces the events an executor consumes
#[async_trait]
pub trait ElementSource<T: Send>: Send {
    /// Next element or watermark; `None` once exhausted
    async fn next_event(&mut self) -> Option<SourceEvent<T>>;

    /// Whether the source is finite
    fn is_bounded(&self) -> bool;

    fn name(&self) -> &str {
        "source"
    }
}

/// The payload-free element an impulse source emits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Impulse;

/// Emits a single impulse at the start of the global window, then ends
#[derive(Debug, Default)]
pub struct BoundedImpulse {
    emitted: bool,
}

impl BoundedImpulse {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ElementSource<Impulse> for BoundedImpulse {
    async fn next_event(&mut self) -> Option<SourceEvent<Impulse>> {
        if self.emitted {
            return None;
        }
        self.emitted = true;

        let window = Window::global();
        Some(SourceEvent::Element {
            value: Impulse,
            timestamp: window.start_timestamp(),
            window: Some(window),
        })
    }

    fn is_bounded(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "bounded_impulse"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PeriodicStep {
    Impulse(i64),
    Watermark(i64),
    Tail,
    Exhausted,
}

/// Impulses every `interval` of event time from `start` through `end`
///
/// Each impulse at `t` is followed by a watermark at `t`. After the last one
/// a final watermark past `end` is emitted and the source ends. An interval
/// of zero emits a single impulse at `start`.
///
/// With `apply_windowing` an impulse at `t` is placed in `[t, t + interval)`;
/// otherwise it belongs to the global window.
#[derive(Debug)]
pub struct PeriodicImpulse {
    start: i64,
    end: i64,
    interval_ms: i64,
    apply_windowing: bool,
    pacing: Duration,
    next: PeriodicStep,
    impulses: u64,
}

impl PeriodicImpulse {
    pub fn new(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: Duration,
        apply_windowing: bool,
    ) -> Self {
        let start = start.timestamp_millis();
        let end = end.timestamp_millis();
        let next = if start <= end {
            PeriodicStep::Impulse(start)
        } else {
            PeriodicStep::Tail
        };

        Self {
            start,
            end,
            interval_ms: i64::try_from(interval.as_millis()).unwrap_or(i64::MAX),
            apply_windowing,
            pacing: Duration::ZERO,
            next,
            impulses: 0,
        }
    }

    /// Wall-clock delay between consecutive ticks
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Impulses emitted so far
    pub fn impulses(&self) -> u64 {
        self.impulses
    }

    fn window_for(&self, timestamp: i64) -> Window {
        if self.apply_windowing && self.interval_ms > 0 {
            Window::from_millis(timestamp, timestamp.saturating_add(self.interval_ms))
                .unwrap_or_else(Window::global)
        } else {
            Window::global()
        }
    }

    async fn pace(&self) {
        if !self.pacing.is_zero() {
            tokio::time::sleep(self.pacing).await;
        }
    }
}

#[async_trait]
impl ElementSource<Impulse> for PeriodicImpulse {
    async fn next_event(&mut self) -> Option<SourceEvent<Impulse>> {
        match self.next {
            PeriodicStep::Impulse(timestamp) => {
                if self.impulses > 0 {
                    self.pace().await;
                }
                self.impulses += 1;
                self.next = PeriodicStep::Watermark(timestamp);
                trace!(timestamp, "Periodic impulse");
                Some(SourceEvent::Element {
                    value: Impulse,
                    timestamp,
                    window: Some(self.window_for(timestamp)),
                })
            }
            PeriodicStep::Watermark(timestamp) => {
                let following = timestamp.saturating_add(self.interval_ms);
                self.next = if self.interval_ms > 0 && following <= self.end {
                    PeriodicStep::Impulse(following)
                } else {
                    PeriodicStep::Tail
                };
                Some(SourceEvent::Watermark(Watermark::new(timestamp)))
            }
            PeriodicStep::Tail => {
                self.pace().await;
                self.next = PeriodicStep::Exhausted;
                let tick = self.end.saturating_add(self.interval_ms.max(1));
                debug!(
                    start = self.start,
                    end = self.end,
                    impulses = self.impulses,
                    "Periodic impulse finished"
                );
                Some(SourceEvent::Watermark(Watermark::new(tick)))
            }
            PeriodicStep::Exhausted => None,
        }
    }

    fn is_bounded(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "periodic_impulse"
    }
}

/// Expands every element of `inner` with `f`
///
/// Expanded elements keep the timestamp and window of the element they came
/// from; watermarks pass through unchanged.
pub struct FlatMapSource<S, F, T, U> {
    inner: S,
    f: F,
    buffer: VecDeque<SourceEvent<U>>,
    _marker: std::marker::PhantomData<fn(T)>,
}

impl<S, F, T, U> FlatMapSource<S, F, T, U>
where
    S: ElementSource<T>,
    F: FnMut(T) -> Vec<U> + Send,
    T: Send,
    U: Send,
{
    pub fn new(inner: S, f: F) -> Self {
        Self {
            inner,
            f,
            buffer: VecDeque::new(),
            _marker: std::marker::PhantomData,
        }
    }
}

#[async_trait]
impl<S, F, T, U> ElementSource<U> for FlatMapSource<S, F, T, U>
where
    S: ElementSource<T>,
    F: FnMut(T) -> Vec<U> + Send,
    T: Send,
    U: Send,
{
    async fn next_event(&mut self) -> Option<SourceEvent<U>> {
        loop {
            if let Some(event) = self.buffer.pop_front() {
                return Some(event);
            }

            match self.inner.next_event().await? {
                SourceEvent::Element {
                    value,
                    timestamp,
                    window,
                } => {
                    let expanded = (self.f)(value);
                    trace!(count = expanded.len(), "Expanded source element");
                    self.buffer
                        .extend(expanded.into_iter().map(|value| SourceEvent::Element {
                            value,
                            timestamp,
                            window: window.clone(),
                        }));
                }
                SourceEvent::Watermark(watermark) => {
                    return Some(SourceEvent::Watermark(watermark));
                }
            }
        }
    }

    fn is_bounded(&self) -> bool {
        self.inner.is_bounded()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

/// Replays a fixed list of events
#[derive(Debug, Clone)]
pub struct VecSource<T> {
    events: VecDeque<SourceEvent<T>>,
    bounded: bool,
}

impl<T> VecSource<T> {
    pub fn new(events: impl IntoIterator<Item = SourceEvent<T>>) -> Self {
        Self {
            events: events.into_iter().collect(),
            bounded: true,
        }
    }

    /// Report the source as unbounded
    pub fn unbounded(mut self) -> Self {
        self.bounded = false;
        self
    }
}

#[async_trait]
impl<T: Send> ElementSource<T> for VecSource<T> {
    async fn next_event(&mut self) -> Option<SourceEvent<T>> {
        self.events.pop_front()
    }

    fn is_bounded(&self) -> bool {
        self.bounded
    }

    fn name(&self) -> &str {
        "vec_source"
    }
}
