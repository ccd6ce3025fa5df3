//! Test doubles shared by the unit tests

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::cache::LocalRateCache;
use crate::db::models::partition_key;
use crate::db::{InMemoryItemStore, RateRepository};
use crate::services::{ProviderError, RateProvider};

/// Provider with scripted rates, failures and panics that counts its calls
#[derive(Default)]
pub struct ScriptedProvider {
    rates: HashMap<String, f64>,
    failing: HashSet<String>,
    panicking: HashSet<String>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rate(mut self, from: &str, to: &str, rate: f64) -> Self {
        self.rates.insert(partition_key(from, to), rate);
        self
    }

    pub fn failing(mut self, from: &str, to: &str) -> Self {
        self.failing.insert(partition_key(from, to));
        self
    }

    pub fn panicking(mut self, from: &str, to: &str) -> Self {
        self.panicking.insert(partition_key(from, to));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RateProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch_rate(&self, from: &str, to: &str, _date: &str) -> Result<f64, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let pair = partition_key(from, to);

        if self.panicking.contains(&pair) {
            panic!("scripted panic for {}", pair);
        }
        if self.failing.contains(&pair) {
            return Err(ProviderError::Status(503));
        }

        self.rates
            .get(&pair)
            .copied()
            .ok_or_else(|| ProviderError::UnsupportedPair {
                from: from.to_string(),
                to: to.to_string(),
            })
    }
}

/// A repository wired to in-memory collaborators, with handles to each
pub struct Harness {
    pub store: Arc<InMemoryItemStore>,
    pub cache: Arc<LocalRateCache>,
    pub provider: Arc<ScriptedProvider>,
    pub repository: RateRepository,
}

impl Harness {
    pub fn new(provider: ScriptedProvider) -> Self {
        let store = Arc::new(InMemoryItemStore::new());
        let cache = Arc::new(LocalRateCache::with_defaults());
        let provider = Arc::new(provider);
        let repository = RateRepository::new(store.clone(), cache.clone(), provider.clone());

        Self {
            store,
            cache,
            provider,
            repository,
        }
    }
}
