//! Exchange rate repository
//!
//! Cache-aside access to exchange rates: local cache, then the persisted
//! store, then the rate provider. Batch operations serve the refresher job.

use chrono::{Duration, Utc};
use std::sync::Arc;

use crate::cache::RateCache;
use crate::db::models::{RateKey, RateKeyRequest, RateRecord};
use crate::db::store::{ItemStore, StoreError, StoreKey, MAX_BATCH_GET_ITEMS, MAX_BATCH_WRITE_ITEMS};
use crate::services::provider::{ProviderError, RateProvider};

/// Default retention of stored records, counted from the rate's date
pub const DEFAULT_RECORD_TTL_DAYS: i64 = 90;

/// Repository for exchange rate facts
#[derive(Clone)]
pub struct RateRepository {
    store: Arc<dyn ItemStore>,
    cache: Arc<dyn RateCache>,
    provider: Arc<dyn RateProvider>,
    batch_write_size: usize,
    record_ttl: Duration,
}

impl RateRepository {
    /// Create a new rate repository
    pub fn new(
        store: Arc<dyn ItemStore>,
        cache: Arc<dyn RateCache>,
        provider: Arc<dyn RateProvider>,
    ) -> Self {
        Self {
            store,
            cache,
            provider,
            batch_write_size: MAX_BATCH_WRITE_ITEMS,
            record_ttl: Duration::days(DEFAULT_RECORD_TTL_DAYS),
        }
    }

    /// Set the chunk size for batch writes, capped at the store's limit
    pub fn with_batch_write_size(mut self, size: usize) -> Self {
        self.batch_write_size = size.clamp(1, MAX_BATCH_WRITE_ITEMS);
        self
    }

    /// Set how long stored records live past their date
    pub fn with_record_ttl(mut self, ttl: Duration) -> Self {
        self.record_ttl = ttl;
        self
    }

    pub fn provider(&self) -> &Arc<dyn RateProvider> {
        &self.provider
    }

    // ========================================================================
    // Single-rate paths
    // ========================================================================

    /// Get the rate for `from`/`to` on `date`.
    ///
    /// A successful call always leaves the cache populated for the key.
    pub async fn get_rate(&self, from: &str, to: &str, date: &str) -> Result<f64, RateError> {
        let request = RateKeyRequest::new(from, to, date);
        let cache_key = request.cache_key();

        if let Some(rate) = self.cache.get(&cache_key).await {
            return Ok(rate);
        }

        let stored = self.read_store(&request).await;
        match stored {
            Ok(rate) => {
                self.cache.set(&cache_key, rate).await;
                Ok(rate)
            }
            Err(RateError::NotFound(_)) | Err(RateError::Decode(_)) => {
                let rate = self.provider.fetch_rate(from, to, date).await?;
                self.cache.set(&cache_key, rate).await;
                self.spawn_write_back(RateKey::new(request, rate));
                Ok(rate)
            }
            Err(e) => Err(e),
        }
    }

    /// Persist a rate, then cache it
    pub async fn save_rate(&self, from: &str, to: &str, date: &str, rate: f64) -> Result<(), RateError> {
        let fact = RateKey::new(RateKeyRequest::new(from, to, date), rate);
        let record = RateRecord::new(&fact, Utc::now(), self.record_ttl);

        self.store.put_item(record.to_dynamodb()).await?;
        self.cache.set(&fact.cache_key(), rate).await;

        Ok(())
    }

    async fn read_store(&self, request: &RateKeyRequest) -> Result<f64, RateError> {
        let key = StoreKey::new(request.partition_key(), request.date.clone());

        let Some(item) = self.store.get_item(&key).await? else {
            tracing::debug!(key = %request, "Rate not in store");
            return Err(RateError::NotFound(request.clone()));
        };

        match RateRecord::from_dynamodb(&item) {
            Some(record) => Ok(record.rate),
            None => {
                tracing::warn!(key = %request, "Stored rate failed to decode");
                Err(RateError::Decode(request.to_string()))
            }
        }
    }

    /// Persist a freshly fetched fact in the background.
    ///
    /// The caller already holds the answer, so failures only reach the log.
    fn spawn_write_back(&self, fact: RateKey) {
        let store = self.store.clone();
        let record = RateRecord::new(&fact, Utc::now(), self.record_ttl);

        tokio::spawn(async move {
            if let Err(e) = store.put_item(record.to_dynamodb()).await {
                tracing::warn!(
                    key = %fact.request,
                    error = %e,
                    "Failed to write back fetched rate"
                );
            }
        });
    }

    // ========================================================================
    // Batch paths
    // ========================================================================

    /// Read every resolvable fact for `keys` from the store.
    ///
    /// Misses are omitted and undecodable records are skipped.
    pub async fn batch_read_store(&self, keys: &[RateKeyRequest]) -> Result<Vec<RateKey>, RateError> {
        let mut facts = Vec::with_capacity(keys.len());

        for chunk in keys.chunks(MAX_BATCH_GET_ITEMS) {
            let store_keys = chunk
                .iter()
                .map(|k| StoreKey::new(k.partition_key(), k.date.clone()))
                .collect();

            let items = self.store.batch_get_items(store_keys).await?;

            for item in items {
                match RateRecord::from_dynamodb(&item) {
                    Some(record) => facts.push(record.into_rate_key()),
                    None => tracing::warn!(item = ?item, "Skipping undecodable rate record"),
                }
            }
        }

        Ok(facts)
    }

    /// Write facts to the store in sequential chunks.
    ///
    /// The first failing chunk aborts the write; earlier chunks stay written.
    pub async fn batch_write_store(&self, facts: &[RateKey]) -> Result<(), RateError> {
        let now = Utc::now();

        for (index, chunk) in facts.chunks(self.batch_write_size).enumerate() {
            let items = chunk
                .iter()
                .map(|fact| RateRecord::new(fact, now, self.record_ttl).to_dynamodb())
                .collect();

            self.store.batch_write_items(items).await.map_err(|e| {
                tracing::warn!(chunk = index, size = chunk.len(), error = %e, "Batch write chunk failed");
                RateError::Store(e)
            })?;
        }

        tracing::debug!(count = facts.len(), "Batch wrote rates");
        Ok(())
    }

    /// Overwrite cache entries with the given facts
    pub async fn batch_hydrate_cache(&self, facts: &[RateKey]) {
        for fact in facts {
            self.cache.set(&fact.cache_key(), fact.rate).await;
        }
    }

    /// Drop cache entries for the given keys
    pub async fn batch_evict_cache(&self, keys: &[RateKeyRequest]) {
        for key in keys {
            self.cache.delete(&key.cache_key()).await;
        }
    }
}

/// Errors that can occur during rate lookups
#[derive(Debug, thiserror::Error)]
pub enum RateError {
    #[error("Rate not found: {0}")]
    NotFound(RateKeyRequest),

    #[error("Stored rate failed to decode: {0}")]
    Decode(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}
