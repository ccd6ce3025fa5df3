//! Daily eviction of cached rates that fell out of the retention window

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use crate::cache::RateCache;
use crate::jobs::scheduler::Job;

pub struct CacheCleaner {
    cache: Arc<dyn RateCache>,
}

impl CacheCleaner {
    pub fn new(cache: Arc<dyn RateCache>) -> Self {
        Self { cache }
    }

    /// Evict expired entries now, returning how many went
    pub async fn run_once(&self) -> usize {
        let evicted = self.cache.scan_and_evict_expired(Utc::now()).await;
        tracing::info!(evicted, "Cache cleaner finished");
        evicted
    }
}

#[async_trait]
impl Job for CacheCleaner {
    fn name(&self) -> &str {
        "cache_cleaner"
    }

    async fn run(&self) {
        self.run_once().await;
    }
}
