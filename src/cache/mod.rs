//! Caching module
//!
//! Contains the process-local rate cache.

pub mod rate_cache;

pub use rate_cache::{LocalRateCache, RateCache, DEFAULT_RETENTION_DAYS};
