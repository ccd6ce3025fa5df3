//! Database module
//!
//! Contains the persisted store contract, its DynamoDB and in-memory
//! backends, the distributed lock and the data access layer.

pub mod dynamodb;
pub mod lock;
pub mod memory;
pub mod models;
pub mod repositories;
pub mod store;

pub use dynamodb::{DynamoDbClient, DynamoItemStore};
pub use lock::{DistributedLock, LockError, StoreLock};
pub use memory::InMemoryItemStore;
pub use models::{LockRecord, RateKey, RateKeyRequest, RateRecord};
pub use repositories::{RateError, RateRepository};
pub use store::{ItemStore, PutCondition, StoreError, StoreKey};
