//! Background Tasks Module
//!
//! Contains the maintenance worker each cache runs in the background.
//!
//! # Tasks
//! - Trim queue: enforces cost, count and age limits after mutations
//! - Age sweep: evicts entries past the age limit at a fixed interval
//! - Invalidation: clears the cache on external signals

mod maintenance;

pub use maintenance::Invalidation;
pub(crate) use maintenance::Maintenance;
