//! Cache Entry Module
//!
//! Defines one cached key/value record with its cost and recency metadata.

use std::time::{Duration, Instant};

// == Entry Id ==
/// Stable handle to an entry slot inside the ordered index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId(pub(crate) usize);

// == Entry ==
/// Represents a single cached value with cost and last-access metadata.
///
/// The recency links are owned by the index and are not visible outside the crate.
#[derive(Debug, Clone)]
pub struct Entry<V> {
    key: String,
    /// The stored value
    pub value: V,
    /// Caller-supplied or policy-computed cost
    pub cost: u64,
    /// Monotonic time of the last read or write
    pub last_access: Instant,
    pub(crate) prev: Option<EntryId>,
    pub(crate) next: Option<EntryId>,
}

impl<V> Entry<V> {
    // == Constructor ==
    /// Creates an unlinked entry stamped with the current time.
    pub fn new(key: impl Into<String>, value: V, cost: u64) -> Self {
        Self::with_access_time(key, value, cost, Instant::now())
    }

    /// Creates an unlinked entry with an explicit access time.
    pub fn with_access_time(key: impl Into<String>, value: V, cost: u64, now: Instant) -> Self {
        Self {
            key: key.into(),
            value,
            cost,
            last_access: now,
            prev: None,
            next: None,
        }
    }

    /// Returns the key, immutable after insertion.
    pub fn key(&self) -> &str {
        &self.key
    }

    // == Touch ==
    /// Records an access at `now`.
    pub fn touch(&mut self, now: Instant) {
        self.last_access = now;
    }

    // == Age ==
    /// Time elapsed between the last access and `now`; zero if `now` is earlier.
    pub fn age_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_access)
    }

    /// Checks whether the entry has gone unaccessed for longer than `limit`.
    ///
    /// An entry exactly `limit` old is still within the window.
    pub fn is_older_than(&self, limit: Duration, now: Instant) -> bool {
        self.age_at(now) > limit
    }

    pub(crate) fn into_value(self) -> V {
        self.value
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_creation() {
        let entry = Entry::new("key", "value", 42);

        assert_eq!(entry.key(), "key");
        assert_eq!(entry.value, "value");
        assert_eq!(entry.cost, 42);
        assert!(entry.prev.is_none());
        assert!(entry.next.is_none());
    }

    #[test]
    fn test_entry_age() {
        let start = Instant::now();
        let entry = Entry::with_access_time("key", (), 0, start);

        assert_eq!(entry.age_at(start), Duration::ZERO);
        assert_eq!(entry.age_at(start + Duration::from_secs(3)), Duration::from_secs(3));
    }

    #[test]
    fn test_age_boundary_condition() {
        let start = Instant::now();
        let entry = Entry::with_access_time("key", (), 0, start);
        let limit = Duration::from_secs(1);

        assert!(!entry.is_older_than(limit, start + limit));
        assert!(entry.is_older_than(limit, start + limit + Duration::from_millis(1)));
    }

    #[test]
    fn test_touch_resets_age() {
        let start = Instant::now();
        let mut entry = Entry::with_access_time("key", (), 0, start);
        let later = start + Duration::from_secs(10);

        entry.touch(later);

        assert_eq!(entry.age_at(later), Duration::ZERO);
        assert!(!entry.is_older_than(Duration::from_secs(1), later));
    }

    #[test]
    fn test_age_before_access_is_zero() {
        let start = Instant::now();
        let entry = Entry::with_access_time("key", (), 0, start + Duration::from_secs(5));

        assert_eq!(entry.age_at(start), Duration::ZERO);
    }
}
