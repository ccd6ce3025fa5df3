//! Fleet-coordinated rate refresh
//!
//! Each tick one replica wins the refresher lock and fetches today's rate for
//! every configured pair into the store. Every other replica hydrates its
//! local cache from what the store already holds.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::config::CurrencyPair;
use crate::db::models::{RateKey, RateKeyRequest, DATE_FORMAT};
use crate::db::{DistributedLock, RateRepository};
use crate::jobs::scheduler::Job;
use crate::services::ProviderError;
use crate::utils::with_timeout;

pub const DEFAULT_LOCK_ID: &str = "rate_refresher_lock";

/// What a single refresher tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// This replica held the lock and fetched from the provider
    Leader {
        fetched: usize,
        failed: usize,
        persisted: bool,
    },
    /// Another replica held the lock; `hydrated` facts were copied into the cache
    Follower { hydrated: usize },
    /// The lock could not be evaluated
    Aborted,
}

pub struct RateRefresher {
    repository: RateRepository,
    lock: Arc<dyn DistributedLock>,
    pairs: Vec<CurrencyPair>,
    lock_id: String,
    lock_ttl: Duration,
    fetch_timeout: Duration,
}

impl RateRefresher {
    pub fn new(
        repository: RateRepository,
        lock: Arc<dyn DistributedLock>,
        pairs: Vec<CurrencyPair>,
        lock_ttl: Duration,
    ) -> Self {
        Self {
            repository,
            lock,
            pairs,
            lock_id: DEFAULT_LOCK_ID.to_string(),
            lock_ttl,
            fetch_timeout: crate::services::provider::DEFAULT_PROVIDER_TIMEOUT,
        }
    }

    pub fn with_lock_id(mut self, lock_id: impl Into<String>) -> Self {
        self.lock_id = lock_id.into();
        self
    }

    /// Bound on each provider call made by the leader
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Run one tick for today's date (UTC)
    pub async fn run_once(&self) -> TickOutcome {
        self.run_for_date(Utc::now().date_naive()).await
    }

    pub async fn run_for_date(&self, date: NaiveDate) -> TickOutcome {
        let date = date.format(DATE_FORMAT).to_string();
        tracing::info!(pairs = self.pairs.len(), date = %date, "Running rate refresher");

        match self.lock.acquire_lock(&self.lock_id, self.lock_ttl).await {
            Ok(true) => self.lead(&date).await,
            Ok(false) => self.follow(&date).await,
            Err(e) => {
                tracing::warn!(lock_id = %self.lock_id, error = %e, "Failed to acquire refresher lock");
                TickOutcome::Aborted
            }
        }
    }

    /// Fetch every pair concurrently, then persist whatever succeeded
    async fn lead(&self, date: &str) -> TickOutcome {
        let results: Arc<Mutex<Vec<RateKey>>> = Arc::new(Mutex::new(Vec::with_capacity(self.pairs.len())));

        let tasks = self.pairs.iter().map(|pair| {
            let provider = self.repository.provider().clone();
            let results = results.clone();
            let request = pair.on(date);
            let timeout = self.fetch_timeout;

            tokio::spawn(async move {
                let rate = with_timeout(
                    timeout,
                    provider.fetch_rate(&request.from, &request.to, &request.date),
                )
                .await
                .map_err(|e| e.flatten(ProviderError::Timeout))?;

                results.lock().await.push(RateKey::new(request, rate));
                Ok::<_, ProviderError>(())
            })
        });
        let joined = join_all(tasks).await;

        let mut failed = 0;
        for (pair, joined) in self.pairs.iter().zip(joined) {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failed += 1;
                    tracing::warn!(pair = %pair, error = %e, "Failed to fetch rate");
                }
                Err(e) => {
                    failed += 1;
                    tracing::error!(pair = %pair, error = %e, "Rate fetch task panicked");
                }
            }
        }

        let facts = std::mem::take(&mut *results.lock().await);
        let fetched = facts.len();

        let persisted = if facts.is_empty() {
            false
        } else {
            match self.repository.batch_write_store(&facts).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(count = fetched, error = %e, "Failed to persist refreshed rates");
                    false
                }
            }
        };

        tracing::info!(fetched, failed, persisted, "Rate refresher finished as leader");
        TickOutcome::Leader {
            fetched,
            failed,
            persisted,
        }
    }

    /// Copy today's stored rates into the local cache
    async fn follow(&self, date: &str) -> TickOutcome {
        let keys: Vec<RateKeyRequest> = self.pairs.iter().map(|pair| pair.on(date)).collect();

        let facts = match self.repository.batch_read_store(&keys).await {
            Ok(facts) => facts,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read refreshed rates");
                return TickOutcome::Follower { hydrated: 0 };
            }
        };

        if facts.is_empty() {
            tracing::info!(date = %date, "No refreshed rates in store yet");
            return TickOutcome::Follower { hydrated: 0 };
        }

        self.repository.batch_hydrate_cache(&facts).await;

        tracing::info!(hydrated = facts.len(), "Rate refresher finished as follower");
        TickOutcome::Follower {
            hydrated: facts.len(),
        }
    }
}

#[async_trait]
impl Job for RateRefresher {
    fn name(&self) -> &str {
        "rate_refresher"
    }

    async fn run(&self) {
        self.run_once().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::RateCache;
    use crate::db::{InMemoryItemStore, ItemStore, RateRecord, StoreKey, StoreLock};
    use crate::testing::{Harness, ScriptedProvider};

    const TTL: Duration = Duration::from_secs(25 * 60);

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    fn pairs() -> Vec<CurrencyPair> {
        vec![
            CurrencyPair::new("USD", "INR"),
            CurrencyPair::new("USD", "EUR"),
            CurrencyPair::new("EUR", "USD"),
        ]
    }

    fn refresher(harness: &Harness, locks: Arc<InMemoryItemStore>) -> RateRefresher {
        RateRefresher::new(harness.repository.clone(), Arc::new(StoreLock::new(locks)), pairs(), TTL)
    }

    async fn stored_rate(harness: &Harness, pk: &str) -> Option<f64> {
        let item = harness
            .store
            .get_item(&StoreKey::new(pk, "2024-05-01"))
            .await
            .unwrap()?;
        RateRecord::from_dynamodb(&item).map(|r| r.rate)
    }

    #[tokio::test]
    async fn test_leader_persists_successful_fetches_only() {
        let provider = ScriptedProvider::new()
            .with_rate("USD", "INR", 83.12)
            .failing("USD", "EUR")
            .with_rate("EUR", "USD", 1.07);
        let harness = Harness::new(provider);
        let job = refresher(&harness, Arc::new(InMemoryItemStore::new()));

        let outcome = job.run_for_date(date()).await;

        assert_eq!(
            outcome,
            TickOutcome::Leader {
                fetched: 2,
                failed: 1,
                persisted: true
            }
        );
        assert_eq!(harness.store.batch_write_sizes().await, vec![2]);
        assert_eq!(stored_rate(&harness, "USD#INR").await, Some(83.12));
        assert_eq!(stored_rate(&harness, "EUR#USD").await, Some(1.07));
        assert_eq!(stored_rate(&harness, "USD#EUR").await, None);
    }

    #[tokio::test]
    async fn test_leader_isolates_panicking_fetch() {
        let provider = ScriptedProvider::new()
            .with_rate("USD", "INR", 83.12)
            .panicking("USD", "EUR")
            .with_rate("EUR", "USD", 1.07);
        let harness = Harness::new(provider);
        let job = refresher(&harness, Arc::new(InMemoryItemStore::new()));

        let outcome = job.run_for_date(date()).await;

        assert_eq!(
            outcome,
            TickOutcome::Leader {
                fetched: 2,
                failed: 1,
                persisted: true
            }
        );
        assert_eq!(harness.provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_leader_with_no_results_skips_write() {
        let harness = Harness::new(ScriptedProvider::new());
        let job = refresher(&harness, Arc::new(InMemoryItemStore::new()));

        let outcome = job.run_for_date(date()).await;

        assert_eq!(
            outcome,
            TickOutcome::Leader {
                fetched: 0,
                failed: 3,
                persisted: false
            }
        );
        assert!(harness.store.batch_write_sizes().await.is_empty());
    }

    #[tokio::test]
    async fn test_leader_write_failure_is_reported() {
        let harness = Harness::new(ScriptedProvider::new().with_rate("USD", "INR", 83.12));
        harness.store.set_fail_writes(true);
        let job = refresher(&harness, Arc::new(InMemoryItemStore::new()));

        let outcome = job.run_for_date(date()).await;
        assert!(matches!(outcome, TickOutcome::Leader { fetched: 1, persisted: false, .. }));
    }

    #[tokio::test]
    async fn test_follower_hydrates_cache_from_store() {
        let harness = Harness::new(ScriptedProvider::new().with_rate("USD", "INR", 83.12));
        harness
            .repository
            .batch_write_store(&[
                RateKey::new(RateKeyRequest::new("USD", "INR", "2024-05-01"), 83.12),
                RateKey::new(RateKeyRequest::new("EUR", "USD", "2024-05-01"), 1.07),
            ])
            .await
            .unwrap();

        let locks = Arc::new(InMemoryItemStore::new());
        assert!(StoreLock::new(locks.clone()).acquire_lock(DEFAULT_LOCK_ID, TTL).await.unwrap());
        let job = refresher(&harness, locks);

        let outcome = job.run_for_date(date()).await;

        assert_eq!(outcome, TickOutcome::Follower { hydrated: 2 });
        assert_eq!(harness.cache.get("USD#INR#2024-05-01").await, Some(83.12));
        assert_eq!(harness.cache.get("EUR#USD#2024-05-01").await, Some(1.07));
        assert_eq!(harness.cache.get("USD#EUR#2024-05-01").await, None);
        assert_eq!(harness.provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_follower_with_empty_store_leaves_cache_unchanged() {
        let harness = Harness::new(ScriptedProvider::new());
        harness.cache.set("USD#INR#2024-05-01", 80.0).await;

        let locks = Arc::new(InMemoryItemStore::new());
        StoreLock::new(locks.clone()).acquire_lock(DEFAULT_LOCK_ID, TTL).await.unwrap();
        let job = refresher(&harness, locks);

        let outcome = job.run_for_date(date()).await;

        assert_eq!(outcome, TickOutcome::Follower { hydrated: 0 });
        assert_eq!(harness.cache.get("USD#INR#2024-05-01").await, Some(80.0));
    }

    #[tokio::test]
    async fn test_follower_store_outage_leaves_cache_unchanged() {
        let harness = Harness::new(ScriptedProvider::new());
        harness.cache.set("USD#INR#2024-05-01", 80.0).await;
        harness.store.set_fail_reads(true);

        let locks = Arc::new(InMemoryItemStore::new());
        StoreLock::new(locks.clone()).acquire_lock(DEFAULT_LOCK_ID, TTL).await.unwrap();
        let job = refresher(&harness, locks);

        assert_eq!(job.run_for_date(date()).await, TickOutcome::Follower { hydrated: 0 });
        assert_eq!(harness.cache.get("USD#INR#2024-05-01").await, Some(80.0));
    }

    #[tokio::test]
    async fn test_lock_error_aborts_tick() {
        let harness = Harness::new(ScriptedProvider::new().with_rate("USD", "INR", 83.12));
        let locks = Arc::new(InMemoryItemStore::new());
        locks.set_fail_writes(true);
        let job = refresher(&harness, locks);

        assert_eq!(job.run_for_date(date()).await, TickOutcome::Aborted);
        assert_eq!(harness.provider.calls(), 0);
        assert!(harness.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_one_leader_per_ttl_window() {
        let harness = Harness::new(ScriptedProvider::new().with_rate("USD", "INR", 83.12));
        let locks = Arc::new(InMemoryItemStore::new());
        let first = refresher(&harness, locks.clone());
        let second = refresher(&harness, locks);

        let (a, b) = tokio::join!(first.run_for_date(date()), second.run_for_date(date()));
        let leaders = [&a, &b]
            .iter()
            .filter(|outcome| matches!(outcome, TickOutcome::Leader { .. }))
            .count();

        assert_eq!(leaders, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_fetch_times_out() {
        struct SlowProvider;

        #[async_trait]
        impl crate::services::RateProvider for SlowProvider {
            fn name(&self) -> &str {
                "slow"
            }

            async fn fetch_rate(&self, _from: &str, _to: &str, _date: &str) -> Result<f64, ProviderError> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(1.0)
            }
        }

        let store = Arc::new(InMemoryItemStore::new());
        let cache = Arc::new(crate::cache::LocalRateCache::with_defaults());
        let repository = RateRepository::new(store.clone(), cache, Arc::new(SlowProvider));
        let job = RateRefresher::new(
            repository,
            Arc::new(StoreLock::new(Arc::new(InMemoryItemStore::new()))),
            pairs(),
            TTL,
        )
        .with_fetch_timeout(Duration::from_secs(5));

        let outcome = job.run_for_date(date()).await;
        assert_eq!(
            outcome,
            TickOutcome::Leader {
                fetched: 0,
                failed: 3,
                persisted: false
            }
        );
    }
}
