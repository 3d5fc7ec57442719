//! Statistics over the current measurement window
//!
//! The aggregator is the only state written by more than one loop: the poll
//! scheduler records items and the follower poller appends samples. Every
//! field sits behind one mutex, taken by [`StatsAggregator::record`],
//! [`StatsAggregator::sample_secondary`] and [`StatsAggregator::snapshot`] and
//! never held across an `.await`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{trace, warn};

use crate::util::minute_index;
use crate::{ActorId, Item};

/// Counters accumulated over one window
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowCounters {
    /// Window start, seconds since epoch
    pub window_start: i64,

    /// Items recorded in this window, including ones emitted before its start
    pub total: u64,

    /// Items per actor
    pub contributors: HashMap<ActorId, u64>,

    /// Items per minute, indexed by minutes between window start and emission
    pub counts_per_minute: Vec<u64>,

    /// Largest observed delay in seconds, indexed by minutes between window
    /// start and observation
    pub max_delay_per_minute: Vec<i64>,

    /// Follower count samples in arrival order
    pub follower_series: Vec<u64>,
}

impl WindowCounters {
    pub fn empty(window_start: i64) -> Self {
        Self {
            window_start,
            ..Default::default()
        }
    }

    fn record(&mut self, item: &Item, observed_at: i64) {
        self.total += 1;
        *self.contributors.entry(item.actor_id).or_insert(0) += 1;

        // an item cannot be emitted after it was observed
        let emitted_at = if item.emitted_at > observed_at {
            warn!(
                "item {} claims emission at {}, after its observation at {observed_at}",
                item.id, item.emitted_at
            );
            observed_at
        } else {
            item.emitted_at
        };

        if let Some(bucket) = minute_index(self.window_start, emitted_at) {
            grow_to(&mut self.counts_per_minute, bucket);
            self.counts_per_minute[bucket] += 1;
        }

        let delay = observed_at.saturating_sub(item.emitted_at);
        if let Some(bucket) = minute_index(self.window_start, observed_at) {
            grow_to(&mut self.max_delay_per_minute, bucket);
            if delay > self.max_delay_per_minute[bucket] {
                self.max_delay_per_minute[bucket] = delay;
            }
        }
    }
}

/// Pad `buckets` with zeros so that `index` is addressable
fn grow_to<T: Default + Clone>(buckets: &mut Vec<T>, index: usize) {
    if buckets.len() <= index {
        buckets.resize(index + 1, T::default());
    }
}

/// Thread-safe window statistics, cheap to clone
#[derive(Debug, Clone)]
pub struct StatsAggregator {
    inner: Arc<Mutex<WindowCounters>>,
}

impl StatsAggregator {
    /// Start an empty window at `window_start`
    pub fn new(window_start: i64) -> Self {
        Self::from_counters(WindowCounters::empty(window_start))
    }

    /// Continue a window from previously flushed counters
    pub fn from_counters(counters: WindowCounters) -> Self {
        Self {
            inner: Arc::new(Mutex::new(counters)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, WindowCounters> {
        // every update leaves the counters consistent, poisoned or not
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count one newly observed item
    pub fn record(&self, item: &Item, observed_at: i64) {
        self.lock().record(item, observed_at);
        trace!("recorded item {} from {}", item.id, item.actor_id);
    }

    /// Append a follower count sample
    pub fn sample_secondary(&self, value: u64) {
        self.lock().follower_series.push(value);
    }

    /// Copy the current window and start a new one at `flushed_at`
    ///
    /// Copy and reset happen under one lock acquisition, so every concurrent
    /// `record` lands either in the returned window or in the new one.
    pub fn snapshot(&self, flushed_at: i64) -> WindowCounters {
        let mut guard = self.lock();
        std::mem::replace(&mut *guard, WindowCounters::empty(flushed_at))
    }

    /// Copy of the current window without resetting it
    pub fn current(&self) -> WindowCounters {
        self.lock().clone()
    }

    pub fn window_start(&self) -> i64 {
        self.lock().window_start
    }

    pub fn total(&self) -> u64 {
        self.lock().total
    }
}
