//! Persisted store contract
//!
//! The repository and the distributed lock talk to the store through
//! [`ItemStore`], so the DynamoDB backend can be swapped for the in-memory
//! one in local development and tests.

use async_trait::async_trait;

use crate::db::models::Item;

/// Maximum number of keys DynamoDB accepts in one BatchGetItem call
pub const MAX_BATCH_GET_ITEMS: usize = 100;

/// Maximum number of put requests DynamoDB accepts in one BatchWriteItem call
pub const MAX_BATCH_WRITE_ITEMS: usize = 25;

/// Primary key of a stored item
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreKey {
    pub pk: String,
    pub sk: String,
}

impl StoreKey {
    pub fn new(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        Self {
            pk: pk.into(),
            sk: sk.into(),
        }
    }
}

/// Predicate a conditional put must satisfy against the existing item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutCondition {
    /// No item exists under the key, or its numeric `attribute` is below `now`
    AbsentOrExpired { attribute: &'static str, now: i64 },
}

/// Key-value access to the persisted store.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Point read. A missing item is `Ok(None)`, not an error.
    async fn get_item(&self, key: &StoreKey) -> Result<Option<Item>, StoreError>;

    /// Unconditional overwrite
    async fn put_item(&self, item: Item) -> Result<(), StoreError>;

    /// Put that fails with [`StoreError::ConditionFailed`] when `condition` does not hold
    async fn put_item_conditional(&self, item: Item, condition: PutCondition) -> Result<(), StoreError>;

    /// Batch read. Misses are omitted from the result.
    async fn batch_get_items(&self, keys: Vec<StoreKey>) -> Result<Vec<Item>, StoreError>;

    /// Write one chunk of at most [`MAX_BATCH_WRITE_ITEMS`] items, all or nothing
    async fn batch_write_items(&self, items: Vec<Item>) -> Result<(), StoreError>;

    /// Check that the store is reachable
    async fn health_check(&self) -> bool;
}

/// Errors that can occur during store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("DynamoDB error: {0}")]
    DynamoDb(String),

    #[error("Conditional check failed")]
    ConditionFailed,

    #[error("Batch of {size} items exceeds the limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },

    #[error("{0} items were left unprocessed")]
    Unprocessed(usize),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}
