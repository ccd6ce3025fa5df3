//! In-memory item store
//!
//! Process-local [`ItemStore`] with DynamoDB's batch limits and conditional
//! put semantics. Used with `STORE_BACKEND=memory` for local development and
//! as the store double in tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{Mutex, RwLock};

use crate::db::models::{get_number, get_string, Item, PARTITION_KEY, SORT_KEY};
use crate::db::store::{
    ItemStore, PutCondition, StoreError, StoreKey, MAX_BATCH_GET_ITEMS, MAX_BATCH_WRITE_ITEMS,
};

#[derive(Default)]
pub struct InMemoryItemStore {
    items: RwLock<HashMap<StoreKey, Item>>,

    /// Size of every batch write call, in call order
    batch_writes: Mutex<Vec<usize>>,

    /// Single-item puts attempted, including rejected ones
    put_attempts: AtomicUsize,

    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl InMemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent read fail with [`StoreError::Unavailable`]
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent write fail with [`StoreError::Unavailable`]
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Sizes of the batch write calls made so far
    pub async fn batch_write_sizes(&self) -> Vec<usize> {
        self.batch_writes.lock().await.clone()
    }

    pub fn put_attempts(&self) -> usize {
        self.put_attempts.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }

    fn key_of(item: &Item) -> Result<StoreKey, StoreError> {
        match (get_string(item, PARTITION_KEY), get_string(item, SORT_KEY)) {
            (Some(pk), Some(sk)) => Ok(StoreKey { pk, sk }),
            _ => Err(StoreError::Unavailable(
                "item is missing its pk/sk attributes".to_string(),
            )),
        }
    }

    fn check_reads(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("reads disabled".to_string()));
        }
        Ok(())
    }

    fn check_writes(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ItemStore for InMemoryItemStore {
    async fn get_item(&self, key: &StoreKey) -> Result<Option<Item>, StoreError> {
        self.check_reads()?;
        Ok(self.items.read().await.get(key).cloned())
    }

    async fn put_item(&self, item: Item) -> Result<(), StoreError> {
        self.put_attempts.fetch_add(1, Ordering::SeqCst);
        self.check_writes()?;
        let key = Self::key_of(&item)?;
        self.items.write().await.insert(key, item);
        Ok(())
    }

    async fn put_item_conditional(&self, item: Item, condition: PutCondition) -> Result<(), StoreError> {
        self.check_writes()?;
        let key = Self::key_of(&item)?;

        // Check and insert under one write guard so the predicate is atomic
        let mut items = self.items.write().await;
        let holds = match (condition, items.get(&key)) {
            (_, None) => true,
            (PutCondition::AbsentOrExpired { attribute, now }, Some(existing)) => {
                get_number(existing, attribute).map(|at| at < now).unwrap_or(false)
            }
        };

        if !holds {
            return Err(StoreError::ConditionFailed);
        }

        items.insert(key, item);
        Ok(())
    }

    async fn batch_get_items(&self, keys: Vec<StoreKey>) -> Result<Vec<Item>, StoreError> {
        self.check_reads()?;
        if keys.len() > MAX_BATCH_GET_ITEMS {
            return Err(StoreError::BatchTooLarge {
                size: keys.len(),
                limit: MAX_BATCH_GET_ITEMS,
            });
        }

        let items = self.items.read().await;
        Ok(keys.iter().filter_map(|key| items.get(key).cloned()).collect())
    }

    async fn batch_write_items(&self, batch: Vec<Item>) -> Result<(), StoreError> {
        self.batch_writes.lock().await.push(batch.len());
        self.check_writes()?;

        if batch.len() > MAX_BATCH_WRITE_ITEMS {
            return Err(StoreError::BatchTooLarge {
                size: batch.len(),
                limit: MAX_BATCH_WRITE_ITEMS,
            });
        }

        let keyed = batch
            .into_iter()
            .map(|item| Self::key_of(&item).map(|key| (key, item)))
            .collect::<Result<Vec<_>, _>>()?;

        self.items.write().await.extend(keyed);
        Ok(())
    }

    async fn health_check(&self) -> bool {
        !self.fail_reads.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{LockRecord, EXPIRES_AT};
    use aws_sdk_dynamodb::types::AttributeValue;

    fn item(pk: &str, sk: &str) -> Item {
        let mut item = HashMap::new();
        item.insert(PARTITION_KEY.to_string(), AttributeValue::S(pk.to_string()));
        item.insert(SORT_KEY.to_string(), AttributeValue::S(sk.to_string()));
        item
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let store = InMemoryItemStore::new();
        store.put_item(item("USD#INR", "2024-01-01")).await.unwrap();

        let found = store.get_item(&StoreKey::new("USD#INR", "2024-01-01")).await.unwrap();
        assert!(found.is_some());

        let missing = store.get_item(&StoreKey::new("USD#INR", "2024-01-02")).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_batch_get_omits_misses() {
        let store = InMemoryItemStore::new();
        store.put_item(item("USD#INR", "2024-01-01")).await.unwrap();

        let found = store
            .batch_get_items(vec![
                StoreKey::new("USD#INR", "2024-01-01"),
                StoreKey::new("USD#EUR", "2024-01-01"),
            ])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_batch_write_rejects_oversized_chunk() {
        let store = InMemoryItemStore::new();
        let batch = (0..26).map(|i| item("USD#INR", &format!("day-{}", i))).collect();

        let result = store.batch_write_items(batch).await;
        assert!(matches!(result, Err(StoreError::BatchTooLarge { size: 26, limit: 25 })));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_conditional_put() {
        let store = InMemoryItemStore::new();
        let live = LockRecord { lock_id: "job".to_string(), expires_at: 200 };

        let condition = PutCondition::AbsentOrExpired { attribute: EXPIRES_AT, now: 100 };
        store.put_item_conditional(live.to_dynamodb(), condition).await.unwrap();

        // Held until 200
        let result = store.put_item_conditional(live.to_dynamodb(), condition).await;
        assert!(matches!(result, Err(StoreError::ConditionFailed)));

        // Expired by 201
        let later = PutCondition::AbsentOrExpired { attribute: EXPIRES_AT, now: 201 };
        store.put_item_conditional(live.to_dynamodb(), later).await.unwrap();
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let store = InMemoryItemStore::new();
        store.set_fail_reads(true);
        assert!(store.get_item(&StoreKey::new("a", "b")).await.is_err());
        assert!(!store.health_check().await);

        store.set_fail_writes(true);
        assert!(store.put_item(item("a", "b")).await.is_err());
        assert_eq!(store.put_attempts(), 1);
    }
}
