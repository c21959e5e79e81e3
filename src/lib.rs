//! Image Memcache - A concurrent in-memory image cache
//!
//! Provides an LRU cache bounded by total cost, entry count and entry age,
//! with background trimming and external invalidation.

pub mod cache;
pub mod config;
pub mod error;
pub mod tasks;

pub use cache::{CacheStats, MemoryCache, MemoryCacheBuilder, PixelFootprint};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use tasks::Invalidation;
