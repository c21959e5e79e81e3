//! Configuration Module
//!
//! Handles loading cache limits and maintenance timings from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{CacheError, Result};

/// Default interval between recurring age sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Default wait for a single trim lock attempt before retrying.
pub const DEFAULT_TRIM_BACKOFF: Duration = Duration::from_millis(10);

/// Memory cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
/// Every limit defaults to unbounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum total cost of all entries
    pub cost_limit: u64,
    /// Maximum number of entries
    pub count_limit: usize,
    /// Maximum time since last access before an entry is swept
    pub age_limit: Duration,
    /// Interval between recurring age sweeps
    pub sweep_interval: Duration,
    /// Bounded wait for each trim lock acquisition
    pub trim_backoff: Duration,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_COST_LIMIT` - Total cost limit (default: unbounded)
    /// - `CACHE_COUNT_LIMIT` - Entry count limit (default: unbounded)
    /// - `CACHE_AGE_LIMIT` - Age limit in seconds (default: unbounded)
    /// - `SWEEP_INTERVAL_MS` - Age sweep frequency in milliseconds (default: 5000)
    /// - `TRIM_BACKOFF_MS` - Trim lock wait in milliseconds (default: 10)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cost_limit: parse_var("CACHE_COST_LIMIT").unwrap_or(defaults.cost_limit),
            count_limit: parse_var("CACHE_COUNT_LIMIT").unwrap_or(defaults.count_limit),
            age_limit: parse_var("CACHE_AGE_LIMIT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.age_limit),
            sweep_interval: parse_var("SWEEP_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.sweep_interval),
            trim_backoff: parse_var("TRIM_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.trim_backoff),
        }
    }

    /// Checks that maintenance timings are usable.
    ///
    /// Limits are never invalid: zero means "evict everything".
    pub fn validate(&self) -> Result<()> {
        if self.sweep_interval.is_zero() {
            return Err(CacheError::InvalidConfig(
                "sweep_interval must be non-zero".to_string(),
            ));
        }
        if self.trim_backoff.is_zero() {
            return Err(CacheError::InvalidConfig(
                "trim_backoff must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cost_limit: u64::MAX,
            count_limit: usize::MAX,
            age_limit: Duration::MAX,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            trim_backoff: DEFAULT_TRIM_BACKOFF,
        }
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}
