//! Memory Cache Module
//!
//! Thread-safe LRU cache bounded by total cost, entry count and entry age.
//!
//! Every mutation of the ordered index happens inside one short critical
//! section. Count overflow on insert is evicted inline; cost and age
//! overflow are handed to the maintenance worker, which trims one entry per
//! lock acquisition.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::debug;

use crate::cache::cost::{pixel_cost, resolve_cost, zero_cost, CostFn, PixelFootprint};
use crate::cache::trim::TrimTarget;
use crate::cache::{CacheStats, Entry, OrderedIndex};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::tasks::{Invalidation, Maintenance};

// == Limits ==
/// The three capacity bounds. Defaults are unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Limits {
    pub(crate) cost: u64,
    pub(crate) count: usize,
    pub(crate) age: Duration,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            cost: u64::MAX,
            count: usize::MAX,
            age: Duration::MAX,
        }
    }
}

impl From<&CacheConfig> for Limits {
    fn from(config: &CacheConfig) -> Self {
        Self {
            cost: config.cost_limit,
            count: config.count_limit,
            age: config.age_limit,
        }
    }
}

/// Everything guarded by the cache lock.
#[derive(Debug)]
pub(crate) struct State<V> {
    pub(crate) index: OrderedIndex<V>,
    pub(crate) limits: Limits,
    pub(crate) stats: CacheStats,
}

/// State shared between the cache handle and its maintenance worker.
pub(crate) struct Shared<V> {
    pub(crate) state: Mutex<State<V>>,
    pub(crate) cost_fn: CostFn<V>,
    pub(crate) trim_backoff: Duration,
}

impl<V> Shared<V> {
    pub(crate) fn new(limits: Limits, cost_fn: CostFn<V>, trim_backoff: Duration) -> Self {
        Self {
            state: Mutex::new(State {
                index: OrderedIndex::new(),
                limits,
                stats: CacheStats::new(),
            }),
            cost_fn,
            trim_backoff,
        }
    }

    /// Drops every entry. Returns how many were removed.
    pub(crate) fn clear(&self) -> usize {
        let cleared = self.state.lock().index.clear();
        cleared.len()
    }
}

// == Memory Cache ==
/// In-memory key/value cache evicting least recently used entries whenever
/// the cost, count or age limit is exceeded.
///
/// Values are returned by clone; store `Arc<T>` for large payloads.
/// Dropping the cache stops its maintenance worker and releases the
/// invalidation subscription.
pub struct MemoryCache<V> {
    shared: Arc<Shared<V>>,
    maintenance: Maintenance,
}

impl<V> MemoryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Builds a cache from `config` on the current tokio runtime.
    pub fn new(config: CacheConfig) -> Result<Self> {
        MemoryCacheBuilder::new().config(config).build()
    }

    pub fn builder() -> MemoryCacheBuilder<V> {
        MemoryCacheBuilder::new()
    }

    // == Get ==
    /// Returns a copy of the value for `key`, promoting it to most recently used.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut state = self.shared.state.lock();
        let state = &mut *state;
        let Some(id) = state.index.find(key) else {
            state.stats.record_miss();
            return None;
        };
        state.index.move_to_front(id);
        let entry = state.index.entry_mut(id)?;
        entry.touch(Instant::now());
        let value = entry.value.clone();
        state.stats.record_hit();
        Some(value)
    }

    // == Put ==
    /// Stores `value` under `key`, costed by the configured cost policy.
    pub fn put(&self, key: impl Into<String>, value: V) {
        self.put_with_cost(key, value, 0);
    }

    /// Stores `value` under `key` with an explicit cost.
    ///
    /// A cost of zero falls back to the cost policy. Count overflow is
    /// evicted before returning; cost overflow is trimmed in the background.
    pub fn put_with_cost(&self, key: impl Into<String>, value: V, cost: u64) {
        let cost = resolve_cost(cost, &value, &self.shared.cost_fn);
        let key = key.into();
        let now = Instant::now();

        let mut evicted = Vec::new();
        let replaced;
        let over_cost;
        {
            let mut state = self.shared.state.lock();
            let state = &mut *state;
            match state.index.find(&key) {
                Some(id) => {
                    replaced = state.index.replace(id, value, cost, now);
                    state.index.move_to_front(id);
                }
                None => {
                    replaced = None;
                    state
                        .index
                        .insert_front(Entry::with_access_time(key, value, cost, now));
                }
            }
            // A lowered count limit may not have been trimmed yet
            while state.index.total_count() > state.limits.count {
                match state.index.pop_tail() {
                    Some(entry) => evicted.push(entry),
                    None => break,
                }
            }
            state.stats.record_evictions(evicted.len());
            over_cost = state.index.total_cost() > state.limits.cost;
        }
        drop(replaced);
        drop(evicted);

        if over_cost {
            self.maintenance.schedule(TrimTarget::Cost);
        }
    }

    // == Remove ==
    /// Removes `key`, returning its value if it was present.
    pub fn remove(&self, key: &str) -> Option<V> {
        let entry = {
            let mut state = self.shared.state.lock();
            let id = state.index.find(key)?;
            state.index.remove(id)
        };
        entry.map(Entry::into_value)
    }

    // == Clear ==
    /// Removes every entry.
    pub fn clear(&self) {
        let removed = self.shared.clear();
        debug!(removed, "memory cache cleared");
    }

    // == Limits ==
    /// Sets the total cost limit and trims to it in the background.
    pub fn set_cost_limit(&self, limit: u64) {
        self.shared.state.lock().limits.cost = limit;
        self.maintenance.schedule(TrimTarget::Cost);
    }

    /// Sets the entry count limit and trims to it in the background.
    pub fn set_count_limit(&self, limit: usize) {
        self.shared.state.lock().limits.count = limit;
        self.maintenance.schedule(TrimTarget::Count);
    }

    /// Sets the age limit and trims to it in the background.
    pub fn set_age_limit(&self, limit: Duration) {
        self.shared.state.lock().limits.age = limit;
        self.maintenance.schedule(TrimTarget::Age);
    }

    pub fn cost_limit(&self) -> u64 {
        self.shared.state.lock().limits.cost
    }

    pub fn count_limit(&self) -> usize {
        self.shared.state.lock().limits.count
    }

    pub fn age_limit(&self) -> Duration {
        self.shared.state.lock().limits.age
    }

    // == Inspection ==
    /// Checks for `key` without touching its recency.
    pub fn contains(&self, key: &str) -> bool {
        self.shared.state.lock().index.find(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().index.total_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_cost(&self) -> u64 {
        self.shared.state.lock().index.total_cost()
    }

    pub fn total_count(&self) -> usize {
        self.len()
    }

    /// Keys from most to least recently used.
    pub fn keys(&self) -> Vec<String> {
        self.shared.state.lock().index.keys()
    }

    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let state = self.shared.state.lock();
        let mut stats = state.stats.clone();
        stats.total_count = state.index.total_count();
        stats.total_cost = state.index.total_cost();
        stats
    }

    /// Asserts the index invariants under the lock.
    #[cfg(test)]
    pub(crate) fn validate_invariants(&self) {
        self.shared.state.lock().index.validate_invariants();
    }

    // == Flush ==
    /// Waits until every trim scheduled before this call has finished.
    pub async fn flush(&self) {
        self.maintenance.flush().await;
    }
}

impl<V> Drop for MemoryCache<V> {
    fn drop(&mut self) {
        debug!("memory cache torn down");
    }
}

// == Builder ==
/// Builder for configuring a [`MemoryCache`].
///
/// # Example
///
/// ```ignore
/// let (signals, _) = tokio::sync::broadcast::channel(4);
/// let cache = MemoryCache::<Arc<Bitmap>>::builder()
///     .cost_limit(64 * 1024 * 1024)
///     .pixel_cost()
///     .invalidation_source(signals.subscribe())
///     .build()?;
/// ```
pub struct MemoryCacheBuilder<V> {
    config: CacheConfig,
    cost_fn: CostFn<V>,
    invalidations: Option<broadcast::Receiver<Invalidation>>,
}

impl<V> MemoryCacheBuilder<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates a builder with unbounded limits and zero-cost values.
    pub fn new() -> Self {
        Self {
            config: CacheConfig::default(),
            cost_fn: zero_cost(),
            invalidations: None,
        }
    }

    /// Replaces every setting with `config`.
    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    pub fn cost_limit(mut self, limit: u64) -> Self {
        self.config.cost_limit = limit;
        self
    }

    pub fn count_limit(mut self, limit: usize) -> Self {
        self.config.count_limit = limit;
        self
    }

    pub fn age_limit(mut self, limit: Duration) -> Self {
        self.config.age_limit = limit;
        self
    }

    /// Interval of the recurring age sweep.
    ///
    /// Default: 5 seconds
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.config.sweep_interval = interval;
        self
    }

    /// Bounded wait for each trim lock attempt.
    ///
    /// Default: 10 milliseconds
    pub fn trim_backoff(mut self, backoff: Duration) -> Self {
        self.config.trim_backoff = backoff;
        self
    }

    /// Cost policy for values stored without an explicit cost.
    pub fn cost_fn(mut self, f: impl Fn(&V) -> u64 + Send + Sync + 'static) -> Self {
        self.cost_fn = Arc::new(f);
        self
    }

    /// Subscribes the cache to external invalidation signals; each one clears it.
    pub fn invalidation_source(mut self, signals: broadcast::Receiver<Invalidation>) -> Self {
        self.invalidations = Some(signals);
        self
    }

    /// Builds the cache on the current tokio runtime.
    pub fn build(self) -> Result<MemoryCache<V>> {
        let handle = Handle::try_current().map_err(|_| CacheError::NoRuntime)?;
        self.build_on(&handle)
    }

    /// Builds the cache with its maintenance worker on `handle`.
    pub fn build_on(self, handle: &Handle) -> Result<MemoryCache<V>> {
        self.config.validate()?;
        let shared = Arc::new(Shared::new(
            Limits::from(&self.config),
            self.cost_fn,
            self.config.trim_backoff,
        ));
        let maintenance = Maintenance::spawn(
            handle,
            Arc::downgrade(&shared),
            self.config.sweep_interval,
            self.invalidations,
        );
        debug!(config = ?self.config, "memory cache created");
        Ok(MemoryCache {
            shared,
            maintenance,
        })
    }
}

impl<V> MemoryCacheBuilder<V>
where
    V: PixelFootprint + Clone + Send + Sync + 'static,
{
    /// Costs values by their decoded pixel footprint.
    pub fn pixel_cost(self) -> Self {
        self.cost_fn(|value: &V| pixel_cost(value))
    }
}

impl<V> Default for MemoryCacheBuilder<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
