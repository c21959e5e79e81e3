//! Ordered Index Module
//!
//! Recency-ordered doubly linked list of entries stored in a slot arena,
//! paired with a key lookup map.
//!
//! ```text
//!   map: key ──► EntryId
//!
//!   head ─► [id_3] ◄──► [id_0] ◄──► [id_1] ◄── tail
//!           (MRU)                     (LRU)
//! ```
//!
//! Links are `EntryId`s into the arena rather than references, and freed
//! slots are recycled through a free list. Every operation is O(1),
//! including `clear`, which detaches storage instead of dropping it in place.
//! The index makes no policy decisions; eviction is driven by the owning cache.

use std::collections::HashMap;
use std::time::Instant;

use crate::cache::entry::{Entry, EntryId};

// == Ordered Index ==
/// Entries ordered from most to least recently used, with aggregate cost and count.
#[derive(Debug)]
pub struct OrderedIndex<V> {
    slots: Vec<Option<Entry<V>>>,
    free: Vec<usize>,
    map: HashMap<String, EntryId>,
    head: Option<EntryId>,
    tail: Option<EntryId>,
    total_cost: u64,
    total_count: usize,
}

impl<V> OrderedIndex<V> {
    // == Constructor ==
    /// Creates an empty index.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            map: HashMap::new(),
            head: None,
            tail: None,
            total_cost: 0,
            total_count: 0,
        }
    }

    /// Sum of all entry costs.
    pub fn total_cost(&self) -> u64 {
        self.total_cost
    }

    /// Number of entries.
    pub fn total_count(&self) -> usize {
        self.total_count
    }

    pub fn is_empty(&self) -> bool {
        self.total_count == 0
    }

    /// Looks up the entry id for `key`.
    pub fn find(&self, key: &str) -> Option<EntryId> {
        self.map.get(key).copied()
    }

    pub fn entry(&self, id: EntryId) -> Option<&Entry<V>> {
        self.slots.get(id.0).and_then(|slot| slot.as_ref())
    }

    pub fn entry_mut(&mut self, id: EntryId) -> Option<&mut Entry<V>> {
        self.slots.get_mut(id.0).and_then(|slot| slot.as_mut())
    }

    /// Most recently used entry.
    pub fn head(&self) -> Option<&Entry<V>> {
        self.head.and_then(|id| self.entry(id))
    }

    // == Peek Tail ==
    /// Least recently used entry, without removing it.
    pub fn peek_tail(&self) -> Option<&Entry<V>> {
        self.tail.and_then(|id| self.entry(id))
    }

    // == Insert Front ==
    /// Inserts `entry` as the new head and adds its cost to the totals.
    ///
    /// A previous entry under the same key is removed first so the map and
    /// the chain always hold the same key set.
    pub fn insert_front(&mut self, mut entry: Entry<V>) -> EntryId {
        if let Some(existing) = self.find(entry.key()) {
            self.remove(existing);
        }

        entry.prev = None;
        entry.next = self.head;
        let cost = entry.cost;
        let key = entry.key().to_string();

        let id = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(entry);
                EntryId(idx)
            }
            None => {
                self.slots.push(Some(entry));
                EntryId(self.slots.len() - 1)
            }
        };

        match self.head {
            Some(old_head) => {
                if let Some(node) = self.entry_mut(old_head) {
                    node.prev = Some(id);
                }
            }
            None => self.tail = Some(id),
        }
        self.head = Some(id);
        self.map.insert(key, id);

        self.total_cost = self.total_cost.saturating_add(cost);
        self.total_count += 1;
        id
    }

    // == Move To Front ==
    /// Promotes `id` to head. Returns `false` for a stale id.
    pub fn move_to_front(&mut self, id: EntryId) -> bool {
        if self.entry(id).is_none() {
            return false;
        }
        if self.head == Some(id) {
            return true;
        }
        self.detach(id);
        self.attach_front(id);
        true
    }

    // == Replace ==
    /// Swaps in a new value and cost for `id`, adjusting the total cost by the
    /// delta and stamping the access time. Does not change recency order.
    ///
    /// Returns the previous value, or `None` for a stale id.
    pub fn replace(&mut self, id: EntryId, value: V, cost: u64, now: Instant) -> Option<V> {
        let entry = self.slots.get_mut(id.0)?.as_mut()?;
        let old_cost = entry.cost;
        let old_value = std::mem::replace(&mut entry.value, value);
        entry.cost = cost;
        entry.touch(now);
        self.total_cost = self.total_cost.saturating_sub(old_cost).saturating_add(cost);
        Some(old_value)
    }

    // == Remove ==
    /// Unlinks `id`, frees its slot and subtracts it from the totals.
    pub fn remove(&mut self, id: EntryId) -> Option<Entry<V>> {
        self.entry(id)?;
        self.detach(id);
        let entry = self.slots.get_mut(id.0)?.take()?;
        self.free.push(id.0);
        self.map.remove(entry.key());
        self.total_cost = self.total_cost.saturating_sub(entry.cost);
        self.total_count -= 1;
        Some(entry)
    }

    /// Removes and returns the least recently used entry.
    pub fn pop_tail(&mut self) -> Option<Entry<V>> {
        let id = self.tail?;
        self.remove(id)
    }

    // == Clear ==
    /// Resets the index in O(1) and hands back the detached entries.
    ///
    /// Callers holding a lock can drop the returned storage after releasing it.
    pub fn clear(&mut self) -> ClearedEntries<V> {
        let count = self.total_count;
        let slots = std::mem::take(&mut self.slots);
        let keys = std::mem::take(&mut self.map);
        self.free.clear();
        self.head = None;
        self.tail = None;
        self.total_cost = 0;
        self.total_count = 0;
        ClearedEntries { slots, keys, count }
    }

    /// Keys from head (MRU) to tail (LRU).
    pub fn keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(self.total_count);
        let mut current = self.head;
        while let Some(id) = current {
            let Some(entry) = self.entry(id) else { break };
            keys.push(entry.key().to_string());
            current = entry.next;
        }
        keys
    }

    fn detach(&mut self, id: EntryId) {
        let Some((prev, next)) = self.entry(id).map(|e| (e.prev, e.next)) else {
            return;
        };

        match prev {
            Some(prev_id) => {
                if let Some(node) = self.entry_mut(prev_id) {
                    node.next = next;
                }
            }
            None => self.head = next,
        }

        match next {
            Some(next_id) => {
                if let Some(node) = self.entry_mut(next_id) {
                    node.prev = prev;
                }
            }
            None => self.tail = prev,
        }

        if let Some(node) = self.entry_mut(id) {
            node.prev = None;
            node.next = None;
        }
    }

    fn attach_front(&mut self, id: EntryId) {
        let old_head = self.head;
        if let Some(node) = self.entry_mut(id) {
            node.prev = None;
            node.next = old_head;
        }
        match old_head {
            Some(old_head) => {
                if let Some(node) = self.entry_mut(old_head) {
                    node.prev = Some(id);
                }
            }
            None => self.tail = Some(id),
        }
        self.head = Some(id);
    }

    /// Walks the chain and asserts every structural invariant.
    #[cfg(test)]
    pub fn validate_invariants(&self) {
        use std::collections::HashSet;

        if self.head.is_none() || self.tail.is_none() {
            assert!(self.head.is_none());
            assert!(self.tail.is_none());
            assert_eq!(self.total_count, 0);
            assert_eq!(self.total_cost, 0);
            assert!(self.map.is_empty());
            return;
        }

        let mut seen = HashSet::new();
        let mut count = 0usize;
        let mut cost = 0u64;
        let mut prev = None;
        let mut current = self.head;

        while let Some(id) = current {
            assert!(seen.insert(id), "cycle at {:?}", id);
            let entry = self.entry(id).expect("linked slot is empty");
            assert_eq!(entry.prev, prev);
            assert_eq!(self.map.get(entry.key()), Some(&id));
            if entry.next.is_none() {
                assert_eq!(self.tail, Some(id));
            }
            count += 1;
            cost += entry.cost;
            assert!(count <= self.total_count);
            prev = Some(id);
            current = entry.next;
        }

        assert_eq!(count, self.total_count);
        assert_eq!(cost, self.total_cost);
        assert_eq!(self.map.len(), self.total_count);
        assert_eq!(self.slots.len() - self.free.len(), self.total_count);
    }
}

// == Cleared Entries ==
/// Entries detached by [`OrderedIndex::clear`], released when dropped.
#[derive(Debug)]
pub struct ClearedEntries<V> {
    slots: Vec<Option<Entry<V>>>,
    keys: HashMap<String, EntryId>,
    count: usize,
}

impl<V> ClearedEntries<V> {
    /// Number of entries that were detached.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Consumes the storage, yielding the detached values.
    pub fn into_values(self) -> impl Iterator<Item = V> {
        drop(self.keys);
        self.slots.into_iter().flatten().map(Entry::into_value)
    }
}

impl<V> Default for OrderedIndex<V> {
    fn default() -> Self {
        Self::new()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn filled(keys: &[(&str, u64)]) -> OrderedIndex<u32> {
        let mut index = OrderedIndex::new();
        for (i, (key, cost)) in keys.iter().enumerate() {
            index.insert_front(Entry::new(*key, i as u32, *cost));
        }
        index
    }

    #[test]
    fn test_index_new() {
        let index: OrderedIndex<u32> = OrderedIndex::new();
        assert!(index.is_empty());
        assert_eq!(index.total_count(), 0);
        assert_eq!(index.total_cost(), 0);
        assert!(index.head().is_none());
        assert!(index.peek_tail().is_none());
        index.validate_invariants();
    }

    #[test]
    fn test_insert_single_is_head_and_tail() {
        let index = filled(&[("a", 5)]);

        assert_eq!(index.head().unwrap().key(), "a");
        assert_eq!(index.peek_tail().unwrap().key(), "a");
        assert_eq!(index.total_count(), 1);
        assert_eq!(index.total_cost(), 5);
        index.validate_invariants();
    }

    #[test]
    fn test_insert_front_order() {
        let index = filled(&[("a", 1), ("b", 2), ("c", 3)]);

        assert_eq!(index.keys(), vec!["c", "b", "a"]);
        assert_eq!(index.peek_tail().unwrap().key(), "a");
        assert_eq!(index.total_cost(), 6);
        index.validate_invariants();
    }

    #[test]
    fn test_insert_duplicate_key_replaces() {
        let mut index = filled(&[("a", 1), ("b", 2)]);

        index.insert_front(Entry::new("a", 9, 10));

        assert_eq!(index.keys(), vec!["a", "b"]);
        assert_eq!(index.total_count(), 2);
        assert_eq!(index.total_cost(), 12);
        index.validate_invariants();
    }

    #[test]
    fn test_move_tail_to_front() {
        let mut index = filled(&[("a", 1), ("b", 1), ("c", 1)]);
        let id = index.find("a").unwrap();

        assert!(index.move_to_front(id));

        assert_eq!(index.keys(), vec!["a", "c", "b"]);
        assert_eq!(index.peek_tail().unwrap().key(), "b");
        index.validate_invariants();
    }

    #[test]
    fn test_move_middle_to_front() {
        let mut index = filled(&[("a", 1), ("b", 1), ("c", 1)]);
        let id = index.find("b").unwrap();

        index.move_to_front(id);

        assert_eq!(index.keys(), vec!["b", "c", "a"]);
        index.validate_invariants();
    }

    #[test]
    fn test_move_head_is_noop() {
        let mut index = filled(&[("a", 1), ("b", 1)]);
        let id = index.find("b").unwrap();

        assert!(index.move_to_front(id));

        assert_eq!(index.keys(), vec!["b", "a"]);
        index.validate_invariants();
    }

    #[test]
    fn test_move_in_two_entry_index() {
        let mut index = filled(&[("a", 1), ("b", 1)]);
        let id = index.find("a").unwrap();

        index.move_to_front(id);

        assert_eq!(index.keys(), vec!["a", "b"]);
        assert_eq!(index.peek_tail().unwrap().key(), "b");
        index.validate_invariants();
    }

    #[test]
    fn test_remove_head_middle_tail() {
        let mut index = filled(&[("a", 1), ("b", 2), ("c", 3), ("d", 4)]);

        let removed = index.remove(index.find("d").unwrap()).unwrap();
        assert_eq!(removed.key(), "d");
        index.validate_invariants();

        index.remove(index.find("b").unwrap());
        index.validate_invariants();

        index.remove(index.find("a").unwrap());
        index.validate_invariants();

        assert_eq!(index.keys(), vec!["c"]);
        assert_eq!(index.total_cost(), 3);
        assert_eq!(index.total_count(), 1);
        assert!(index.find("a").is_none());
    }

    #[test]
    fn test_remove_last_entry_empties_index() {
        let mut index = filled(&[("a", 7)]);

        index.remove(index.find("a").unwrap());

        assert!(index.is_empty());
        assert!(index.head().is_none());
        assert!(index.peek_tail().is_none());
        assert_eq!(index.total_cost(), 0);
        index.validate_invariants();
    }

    #[test]
    fn test_stale_id_is_rejected() {
        let mut index = filled(&[("a", 1), ("b", 1)]);
        let id = index.find("a").unwrap();
        index.remove(id);

        assert!(index.remove(id).is_none());
        assert!(!index.move_to_front(id));
        assert!(index.replace(id, 0, 5, Instant::now()).is_none());
        assert_eq!(index.total_count(), 1);
        index.validate_invariants();
    }

    #[test]
    fn test_freed_slot_is_reused() {
        let mut index = filled(&[("a", 1), ("b", 1)]);
        let id = index.find("a").unwrap();
        index.remove(id);

        let reused = index.insert_front(Entry::new("c", 3, 1));

        assert_eq!(reused, id);
        assert_eq!(index.keys(), vec!["c", "b"]);
        index.validate_invariants();
    }

    #[test]
    fn test_pop_tail() {
        let mut index = filled(&[("a", 1), ("b", 2)]);

        assert_eq!(index.pop_tail().unwrap().key(), "a");
        assert_eq!(index.pop_tail().unwrap().key(), "b");
        assert!(index.pop_tail().is_none());
        index.validate_invariants();
    }

    #[test]
    fn test_replace_adjusts_cost() {
        let mut index = filled(&[("a", 10), ("b", 20)]);
        let id = index.find("a").unwrap();

        let old = index.replace(id, 99, 4, Instant::now());

        assert_eq!(old, Some(0));
        assert_eq!(index.total_cost(), 24);
        assert_eq!(index.entry(id).unwrap().value, 99);
        // Replacing does not promote
        assert_eq!(index.peek_tail().unwrap().key(), "a");
        index.validate_invariants();
    }

    #[test]
    fn test_clear_returns_detached_entries() {
        let mut index = filled(&[("a", 1), ("b", 2), ("c", 3)]);
        index.remove(index.find("b").unwrap());

        let cleared = index.clear();

        assert_eq!(cleared.len(), 2);
        let mut values: Vec<u32> = cleared.into_values().collect();
        values.sort();
        assert_eq!(values, vec![0, 2]);
        assert!(index.find("a").is_none());
        index.validate_invariants();
    }

    #[test]
    fn test_clear_twice() {
        let mut index = filled(&[("a", 1), ("b", 2), ("c", 3)]);

        assert_eq!(index.clear().len(), 3);
        assert_eq!(index.total_count(), 0);
        assert_eq!(index.total_cost(), 0);
        index.validate_invariants();

        assert!(index.clear().is_empty());
        assert_eq!(index.total_count(), 0);
        assert_eq!(index.total_cost(), 0);
        index.validate_invariants();
    }

    #[test]
    fn test_zero_cost_entries() {
        let mut index = filled(&[("a", 0), ("b", 0)]);

        assert_eq!(index.total_cost(), 0);
        index.pop_tail();
        assert_eq!(index.total_cost(), 0);
        index.validate_invariants();
    }
}
