//! Application state container
//!
//! This module defines the shared application state that is passed
//! to all request handlers via Axum's state extraction.

use std::sync::Arc;
use std::time::Instant;

use crate::cache::{LocalRateCache, RateCache};
use crate::config::{create_dynamodb_client, ProviderKind, Settings, StoreBackend};
use crate::db::{DynamoDbClient, DynamoItemStore, InMemoryItemStore, ItemStore, RateRepository, StoreLock};
use crate::jobs::{CacheCleaner, RateRefresher};
use crate::services::{CurrencyService, ExchangeRateApi, RateProvider, StaticRateProvider};

/// Shared application state
///
/// Cheap to clone; every component sits behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Application settings
    pub settings: Arc<Settings>,

    /// Persisted rate store
    pub store: Arc<dyn ItemStore>,

    /// Process-local rate cache shared with the jobs
    pub cache: Arc<dyn RateCache>,

    pub currency: CurrencyService,

    pub refresher: Arc<RateRefresher>,

    pub cleaner: Arc<CacheCleaner>,

    /// Application start time (for uptime calculation)
    pub start_time: Instant,
}

impl AppState {
    /// Create a new application state from settings.
    ///
    /// Builds the store backend and rate provider selected in settings.
    pub async fn new(settings: Settings) -> anyhow::Result<Self> {
        let settings = Arc::new(settings);

        let (store, lock_store): (Arc<dyn ItemStore>, Arc<dyn ItemStore>) = match settings.store_backend {
            StoreBackend::DynamoDb => {
                tracing::debug!(
                    region = %settings.aws_region,
                    dynamodb_endpoint = ?settings.dynamodb_endpoint_url,
                    rates_table = %settings.dynamodb_rates_table,
                    lock_table = %settings.dynamodb_lock_table,
                    "Creating DynamoDB client"
                );
                let sdk_client = create_dynamodb_client(&settings).await;
                let client = Arc::new(DynamoDbClient::new(settings.clone(), sdk_client));
                let rates: Arc<dyn ItemStore> = Arc::new(DynamoItemStore::rates(client.clone()));
                let locks: Arc<dyn ItemStore> = Arc::new(DynamoItemStore::locks(client));
                (rates, locks)
            }
            StoreBackend::Memory => {
                tracing::info!("Using in-memory rate store");
                let store: Arc<dyn ItemStore> = Arc::new(InMemoryItemStore::new());
                (store.clone(), store)
            }
        };

        let provider: Arc<dyn RateProvider> = match settings.rate_provider {
            ProviderKind::Http => {
                tracing::debug!(base_url = %settings.rate_api_base_url, "Using exchange rate API");
                Arc::new(ExchangeRateApi::new(
                    settings.rate_api_base_url.as_str(),
                    settings.provider_timeout(),
                )?)
            }
            ProviderKind::Static => {
                tracing::info!("Using static sample rates");
                Arc::new(StaticRateProvider::with_sample_rates())
            }
        };

        Ok(Self::with_components(settings, store, lock_store, provider))
    }

    /// Assemble the state around already-built store and provider
    pub fn with_components(
        settings: Arc<Settings>,
        store: Arc<dyn ItemStore>,
        lock_store: Arc<dyn ItemStore>,
        provider: Arc<dyn RateProvider>,
    ) -> Self {
        let cache: Arc<dyn RateCache> = Arc::new(LocalRateCache::new(chrono::Duration::days(
            settings.cache_retention_days,
        )));

        let repository = RateRepository::new(store.clone(), cache.clone(), provider)
            .with_batch_write_size(settings.batch_write_size)
            .with_record_ttl(chrono::Duration::days(settings.record_ttl_days));

        let refresher = RateRefresher::new(
            repository.clone(),
            Arc::new(StoreLock::new(lock_store)),
            settings.currency_pairs.clone(),
            settings.jobs.lock_ttl(),
        )
        .with_lock_id(settings.jobs.refresh_lock_id.clone())
        .with_fetch_timeout(settings.provider_timeout());

        let cleaner = CacheCleaner::new(cache.clone());

        tracing::info!(
            pairs = settings.currency_pairs.len(),
            currencies = settings.supported_currencies.len(),
            "Application state initialized successfully"
        );

        Self {
            currency: CurrencyService::new(repository),
            refresher: Arc::new(refresher),
            cleaner: Arc::new(cleaner),
            settings,
            store,
            cache,
            start_time: Instant::now(),
        }
    }

    /// Get the application uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub async fn check_store_health(&self) -> bool {
        self.store.health_check().await
    }
}
