//! Trim Module
//!
//! Evicts least recently used entries until one dimension is back within its limit.
//!
//! A trim checks the limit once under the lock, releases it, then evicts a
//! single tail entry per lock acquisition. Acquisition waits at most
//! `trim_backoff` before retrying, so foreground callers never queue behind
//! more than one removal.

use std::fmt;
use std::time::Instant;

use parking_lot::MutexGuard;
use tracing::trace;

use crate::cache::memory::{Shared, State};

// == Trim Target ==
/// The limit a trim enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimTarget {
    Cost,
    Count,
    Age,
}

impl fmt::Display for TrimTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrimTarget::Cost => "cost",
            TrimTarget::Count => "count",
            TrimTarget::Age => "age",
        };
        f.write_str(name)
    }
}

impl<V> State<V> {
    /// Whether the limit for `target` is zero, meaning "hold nothing".
    fn limit_is_zero(&self, target: TrimTarget) -> bool {
        match target {
            TrimTarget::Cost => self.limits.cost == 0,
            TrimTarget::Count => self.limits.count == 0,
            TrimTarget::Age => self.limits.age.is_zero(),
        }
    }

    /// Whether the tail must go to satisfy `target`.
    fn exceeds(&self, target: TrimTarget, now: Instant) -> bool {
        match target {
            TrimTarget::Cost => self.index.total_cost() > self.limits.cost,
            TrimTarget::Count => self.index.total_count() > self.limits.count,
            TrimTarget::Age => self
                .index
                .peek_tail()
                .is_some_and(|tail| tail.is_older_than(self.limits.age, now)),
        }
    }
}

impl<V> Shared<V> {
    // == Trim ==
    /// Evicts tail entries until `target` is within its current limit.
    ///
    /// Limits are re-read on every acquisition, so a trim tolerates the cache
    /// being cleared or reconfigured while it runs. Age is measured against
    /// the time the trim started. Returns the number of entries evicted.
    pub(crate) fn trim(&self, target: TrimTarget) -> usize {
        let now = Instant::now();
        {
            let mut state = self.state.lock();
            if state.limit_is_zero(target) {
                let cleared = state.index.clear();
                state.stats.record_evictions(cleared.len());
                drop(state);
                return cleared.len();
            }
            if !state.exceeds(target, now) {
                return 0;
            }
        }

        let mut evicted = 0;
        loop {
            let Some(mut state) = self.state.try_lock_for(self.trim_backoff) else {
                trace!(%target, "trim lock busy, retrying");
                continue;
            };
            if !state.exceeds(target, now) {
                break;
            }
            let Some(entry) = state.index.pop_tail() else {
                break;
            };
            state.stats.record_evictions(1);
            MutexGuard::unlock_fair(state);
            drop(entry);
            evicted += 1;
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::Limits;
    use crate::cache::Entry;
    use std::time::Duration;

    fn shared(limits: Limits) -> Shared<u32> {
        Shared::new(limits, crate::cache::zero_cost(), Duration::from_millis(10))
    }

    fn fill(shared: &Shared<u32>, entries: &[(&str, u64)]) {
        let mut state = shared.state.lock();
        for (i, (key, cost)) in entries.iter().enumerate() {
            state.index.insert_front(Entry::new(*key, i as u32, *cost));
        }
    }

    #[test]
    fn test_trim_cost_evicts_lru_first() {
        let shared = shared(Limits {
            cost: 100,
            ..Limits::default()
        });
        fill(&shared, &[("x", 60), ("y", 30), ("z", 30)]);

        assert_eq!(shared.trim(TrimTarget::Cost), 1);

        let state = shared.state.lock();
        assert_eq!(state.index.keys(), vec!["z", "y"]);
        assert_eq!(state.index.total_cost(), 60);
        assert_eq!(state.stats.evictions, 1);
        state.index.validate_invariants();
    }

    #[test]
    fn test_trim_within_limit_is_noop() {
        let shared = shared(Limits {
            cost: 100,
            count: 5,
            ..Limits::default()
        });
        fill(&shared, &[("a", 50), ("b", 50)]);

        assert_eq!(shared.trim(TrimTarget::Cost), 0);
        assert_eq!(shared.trim(TrimTarget::Count), 0);
        assert_eq!(shared.trim(TrimTarget::Age), 0);
        assert_eq!(shared.state.lock().index.total_count(), 2);
    }

    #[test]
    fn test_trim_count() {
        let shared = shared(Limits {
            count: 2,
            ..Limits::default()
        });
        fill(&shared, &[("a", 0), ("b", 0), ("c", 0), ("d", 0)]);

        assert_eq!(shared.trim(TrimTarget::Count), 2);

        let state = shared.state.lock();
        assert_eq!(state.index.keys(), vec!["d", "c"]);
        state.index.validate_invariants();
    }

    #[test]
    fn test_trim_zero_limit_clears() {
        let shared = shared(Limits {
            cost: 0,
            ..Limits::default()
        });
        fill(&shared, &[("a", 0), ("b", 0)]);

        // Zero-cost entries still go when the limit is zero
        assert_eq!(shared.trim(TrimTarget::Cost), 2);

        let state = shared.state.lock();
        assert!(state.index.is_empty());
        assert_eq!(state.stats.evictions, 2);
    }

    #[test]
    fn test_trim_age_stops_at_fresh_entry() {
        let shared = shared(Limits {
            age: Duration::from_millis(50),
            ..Limits::default()
        });
        {
            let mut state = shared.state.lock();
            let stale = Instant::now();
            state.index.insert_front(Entry::with_access_time("old1", 1, 0, stale));
            state.index.insert_front(Entry::with_access_time("old2", 2, 0, stale));
        }
        std::thread::sleep(Duration::from_millis(120));
        shared
            .state
            .lock()
            .index
            .insert_front(Entry::with_access_time("fresh", 3, 0, Instant::now()));

        let evicted = shared.trim(TrimTarget::Age);

        let state = shared.state.lock();
        assert_eq!(evicted, 2);
        assert_eq!(state.index.keys(), vec!["fresh"]);
        state.index.validate_invariants();
    }

    #[test]
    fn test_trim_zero_age_clears() {
        let shared = shared(Limits {
            age: Duration::ZERO,
            ..Limits::default()
        });
        fill(&shared, &[("a", 0)]);

        assert_eq!(shared.trim(TrimTarget::Age), 1);
        assert!(shared.state.lock().index.is_empty());
    }

    #[test]
    fn test_trim_on_empty_cache() {
        let shared = shared(Limits {
            cost: 10,
            count: 1,
            age: Duration::from_secs(1),
        });

        assert_eq!(shared.trim(TrimTarget::Cost), 0);
        assert_eq!(shared.trim(TrimTarget::Count), 0);
        assert_eq!(shared.trim(TrimTarget::Age), 0);
    }

    #[test]
    fn test_trim_waits_for_busy_lock() {
        let shared = std::sync::Arc::new(shared(Limits {
            count: 1,
            ..Limits::default()
        }));
        fill(&shared, &[("a", 0), ("b", 0), ("c", 0)]);

        let guard = shared.state.lock();
        let worker = {
            let shared = shared.clone();
            std::thread::spawn(move || shared.trim(TrimTarget::Count))
        };
        std::thread::sleep(Duration::from_millis(50));
        drop(guard);

        assert_eq!(worker.join().unwrap(), 2);
        assert_eq!(shared.state.lock().index.keys(), vec!["c"]);
    }

    #[test]
    fn test_target_display() {
        assert_eq!(TrimTarget::Cost.to_string(), "cost");
        assert_eq!(TrimTarget::Count.to_string(), "count");
        assert_eq!(TrimTarget::Age.to_string(), "age");
    }
}
