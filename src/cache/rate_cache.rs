//! In-memory rate cache
//!
//! Process-local map from cache key (`FROM#TO#DATE`) to rate. Entries never
//! expire on their own; the cache cleaner job evicts facts whose date has
//! fallen outside the retention window.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use moka::future::Cache;

use crate::db::models::{parse_cache_key, start_of_day};

/// Default retention window for cached facts
pub const DEFAULT_RETENTION_DAYS: i64 = 90;

/// Rate cache shared by the read path and the background jobs.
///
/// Async so a networked cache can stand in for the local one.
#[async_trait]
pub trait RateCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<f64>;

    async fn set(&self, key: &str, rate: f64);

    async fn delete(&self, key: &str);

    /// Remove entries whose embedded date is older than the retention window
    /// relative to `now`. Keys that do not parse are left alone.
    ///
    /// Returns the number of evicted entries.
    async fn scan_and_evict_expired(&self, now: DateTime<Utc>) -> usize;
}

/// [`RateCache`] on a moka concurrent cache
#[derive(Clone)]
pub struct LocalRateCache {
    entries: Cache<String, f64>,
    retention: Duration,
}

impl LocalRateCache {
    /// Unbounded by size; only `delete` and the expiry scan remove entries.
    pub fn new(retention: Duration) -> Self {
        let entries = Cache::builder().build();
        Self { entries, retention }
    }

    pub fn with_defaults() -> Self {
        Self::new(Duration::days(DEFAULT_RETENTION_DAYS))
    }

    fn is_expired(&self, key: &str, now: DateTime<Utc>) -> bool {
        match parse_cache_key(key) {
            Some((_, _, date)) => now.signed_duration_since(start_of_day(date)) > self.retention,
            None => false,
        }
    }
}

#[async_trait]
impl RateCache for LocalRateCache {
    async fn get(&self, key: &str) -> Option<f64> {
        self.entries.get(key).await
    }

    async fn set(&self, key: &str, rate: f64) {
        self.entries.insert(key.to_string(), rate).await;
    }

    async fn delete(&self, key: &str) {
        self.entries.invalidate(key).await;
    }

    async fn scan_and_evict_expired(&self, now: DateTime<Utc>) -> usize {
        // Collect first; the scan is best effort against concurrent inserts
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(key, _)| self.is_expired(key.as_str(), now))
            .map(|(key, _)| key.to_string())
            .collect();

        for key in &expired {
            self.entries.invalidate(key.as_str()).await;
        }

        tracing::debug!(evicted = expired.len(), "Scanned rate cache for expired entries");
        expired.len()
    }
}
