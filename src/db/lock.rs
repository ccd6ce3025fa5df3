//! Distributed lock
//!
//! Mutual exclusion across replicas via a conditional put on a named lock
//! record. A lock is held until its `expires_at` passes; there is no unlock,
//! so a crashed holder never blocks the next acquisition for longer than its ttl.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use crate::db::models::{LockRecord, EXPIRES_AT};
use crate::db::store::{ItemStore, PutCondition, StoreError};

/// Cross-process lock
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Try to take `lock_id` for `ttl`.
    ///
    /// Returns `Ok(false)` when another holder's lock is still live.
    async fn acquire_lock(&self, lock_id: &str, ttl: Duration) -> Result<bool, LockError>;
}

/// [`DistributedLock`] built on an [`ItemStore`] conditional put
#[derive(Clone)]
pub struct StoreLock {
    store: Arc<dyn ItemStore>,
}

impl StoreLock {
    pub fn new(store: Arc<dyn ItemStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl DistributedLock for StoreLock {
    async fn acquire_lock(&self, lock_id: &str, ttl: Duration) -> Result<bool, LockError> {
        let now = Utc::now().timestamp();
        let ttl_seconds = i64::try_from(ttl.as_secs()).map_err(|_| LockError::InvalidTtl(ttl))?;

        let record = LockRecord {
            lock_id: lock_id.to_string(),
            expires_at: now + ttl_seconds,
        };

        let condition = PutCondition::AbsentOrExpired {
            attribute: EXPIRES_AT,
            now,
        };

        match self.store.put_item_conditional(record.to_dynamodb(), condition).await {
            Ok(()) => {
                tracing::info!(
                    lock_id = %lock_id,
                    expires_at = record.expires_at,
                    "Acquired lock"
                );
                Ok(true)
            }
            Err(StoreError::ConditionFailed) => {
                tracing::debug!(lock_id = %lock_id, "Lock held elsewhere");
                Ok(false)
            }
            Err(e) => Err(LockError::Store(e)),
        }
    }
}

/// Errors that can occur while acquiring a lock
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("Failed to acquire lock: {0}")]
    Store(#[from] StoreError),

    #[error("Lock ttl out of range: {0:?}")]
    InvalidTtl(Duration),
}
