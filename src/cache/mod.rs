//! Cache Module
//!
//! Provides an in-memory LRU cache bounded by cost, count and age.

mod cost;
mod entry;
mod index;
pub(crate) mod memory;
mod stats;
mod trim;


// Re-export public types
pub use cost::{pixel_cost, zero_cost, CostFn, PixelFootprint};
pub use entry::{Entry, EntryId};
pub use index::{ClearedEntries, OrderedIndex};
pub use memory::{MemoryCache, MemoryCacheBuilder};
pub use stats::CacheStats;
pub use trim::TrimTarget;
