//! Error types for the memory cache
//!
//! Cache operations themselves never fail; these errors cover construction
//! and the background maintenance worker.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the memory cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// No tokio runtime is available to host the maintenance worker
    #[error("no tokio runtime available to run cache maintenance")]
    NoRuntime,

    /// Configuration values are out of range
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// The maintenance worker could not accept or finish a job
    #[error("Maintenance worker error: {0}")]
    Worker(String),
}

// == Result Type Alias ==
/// Convenience Result type for the memory cache.
pub type Result<T> = std::result::Result<T, CacheError>;
