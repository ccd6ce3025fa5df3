//! DynamoDB client wrapper
//!
//! This module provides a wrapper around the AWS DynamoDB SDK client and the
//! [`ItemStore`] implementation backed by it.

use async_trait::async_trait;
use aws_sdk_dynamodb::types::{AttributeValue, KeysAndAttributes, PutRequest, WriteRequest};
use aws_sdk_dynamodb::Client as DynamoDbSdkClient;
use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_types::error::display::DisplayErrorContext;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Settings;
use crate::db::models::{Item, PARTITION_KEY, SORT_KEY};
use crate::db::store::{
    ItemStore, PutCondition, StoreError, StoreKey, MAX_BATCH_GET_ITEMS, MAX_BATCH_WRITE_ITEMS,
};

/// DynamoDB client wrapper for database operations.
///
/// This struct wraps the AWS DynamoDB SDK client together with the
/// table names from settings.
#[derive(Clone)]
pub struct DynamoDbClient {
    /// Application settings
    settings: Arc<Settings>,

    /// AWS DynamoDB SDK client
    client: DynamoDbSdkClient,
}

impl DynamoDbClient {
    /// Create a new DynamoDB client.
    ///
    /// # Arguments
    /// * `settings` - Application settings containing DynamoDB configuration
    /// * `client` - AWS DynamoDB SDK client
    pub fn new(settings: Arc<Settings>, client: DynamoDbSdkClient) -> Self {
        Self { settings, client }
    }

    /// Get a reference to the underlying AWS SDK client
    pub fn client(&self) -> &DynamoDbSdkClient {
        &self.client
    }

    /// Get the exchange rates table name
    pub fn rates_table(&self) -> &str {
        &self.settings.dynamodb_rates_table
    }

    /// Get the lock table name
    pub fn lock_table(&self) -> &str {
        &self.settings.dynamodb_lock_table
    }

    /// Check if the DynamoDB connection is healthy
    ///
    /// Performs a simple list_tables operation to verify connectivity.
    pub async fn health_check(&self) -> bool {
        match self.client.list_tables().limit(1).send().await {
            Ok(_) => {
                tracing::debug!("DynamoDB health check passed");
                true
            }
            Err(e) => {
                tracing::warn!(error = %DisplayErrorContext(&e), "DynamoDB health check failed");
                false
            }
        }
    }
}

/// [`ItemStore`] over a single DynamoDB table with a `pk`/`sk` key schema.
#[derive(Clone)]
pub struct DynamoItemStore {
    client: Arc<DynamoDbClient>,
    table: String,
}

impl DynamoItemStore {
    pub fn new(client: Arc<DynamoDbClient>, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }

    /// Store over the exchange rates table
    pub fn rates(client: Arc<DynamoDbClient>) -> Self {
        let table = client.rates_table().to_string();
        Self::new(client, table)
    }

    /// Store over the lock table
    pub fn locks(client: Arc<DynamoDbClient>) -> Self {
        let table = client.lock_table().to_string();
        Self::new(client, table)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn key_attributes(key: &StoreKey) -> Item {
        let mut item = HashMap::new();
        item.insert(PARTITION_KEY.to_string(), AttributeValue::S(key.pk.clone()));
        item.insert(SORT_KEY.to_string(), AttributeValue::S(key.sk.clone()));
        item
    }
}

fn sdk_error<E, R>(err: SdkError<E, R>) -> StoreError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    StoreError::DynamoDb(DisplayErrorContext(&err).to_string())
}

#[async_trait]
impl ItemStore for DynamoItemStore {
    async fn get_item(&self, key: &StoreKey) -> Result<Option<Item>, StoreError> {
        let result = self
            .client
            .client()
            .get_item()
            .table_name(&self.table)
            .set_key(Some(Self::key_attributes(key)))
            .send()
            .await
            .map_err(sdk_error)?;

        Ok(result.item)
    }

    async fn put_item(&self, item: Item) -> Result<(), StoreError> {
        self.client
            .client()
            .put_item()
            .table_name(&self.table)
            .set_item(Some(item))
            .send()
            .await
            .map_err(sdk_error)?;

        Ok(())
    }

    async fn put_item_conditional(&self, item: Item, condition: PutCondition) -> Result<(), StoreError> {
        let PutCondition::AbsentOrExpired { attribute, now } = condition;

        let result = self
            .client
            .client()
            .put_item()
            .table_name(&self.table)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(#pk) OR #expiry < :now")
            .expression_attribute_names("#pk", PARTITION_KEY)
            .expression_attribute_names("#expiry", attribute)
            .expression_attribute_values(":now", AttributeValue::N(now.to_string()))
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                let condition_failed = err
                    .as_service_error()
                    .map(|e| e.is_conditional_check_failed_exception())
                    .unwrap_or(false);

                if condition_failed {
                    Err(StoreError::ConditionFailed)
                } else {
                    Err(sdk_error(err))
                }
            }
        }
    }

    async fn batch_get_items(&self, keys: Vec<StoreKey>) -> Result<Vec<Item>, StoreError> {
        if keys.len() > MAX_BATCH_GET_ITEMS {
            return Err(StoreError::BatchTooLarge {
                size: keys.len(),
                limit: MAX_BATCH_GET_ITEMS,
            });
        }

        let request = KeysAndAttributes::builder()
            .set_keys(Some(keys.iter().map(Self::key_attributes).collect()))
            .build()
            .map_err(|e| StoreError::DynamoDb(e.to_string()))?;

        let output = self
            .client
            .client()
            .batch_get_item()
            .request_items(&self.table, request)
            .send()
            .await
            .map_err(sdk_error)?;

        let unprocessed = output
            .unprocessed_keys
            .as_ref()
            .and_then(|pending| pending.get(&self.table))
            .map(|pending| pending.keys().len())
            .unwrap_or(0);
        if unprocessed > 0 {
            tracing::warn!(
                table = %self.table,
                unprocessed = unprocessed,
                "Batch get left keys unprocessed, returning partial results"
            );
        }

        let items = output
            .responses
            .and_then(|mut responses| responses.remove(&self.table))
            .unwrap_or_default();

        Ok(items)
    }

    async fn batch_write_items(&self, items: Vec<Item>) -> Result<(), StoreError> {
        if items.len() > MAX_BATCH_WRITE_ITEMS {
            return Err(StoreError::BatchTooLarge {
                size: items.len(),
                limit: MAX_BATCH_WRITE_ITEMS,
            });
        }

        let mut requests = Vec::with_capacity(items.len());
        for item in items {
            let put = PutRequest::builder()
                .set_item(Some(item))
                .build()
                .map_err(|e| StoreError::DynamoDb(e.to_string()))?;
            requests.push(WriteRequest::builder().put_request(put).build());
        }

        let output = self
            .client
            .client()
            .batch_write_item()
            .request_items(&self.table, requests)
            .send()
            .await
            .map_err(sdk_error)?;

        let unprocessed = output
            .unprocessed_items
            .as_ref()
            .and_then(|pending| pending.get(&self.table))
            .map(|pending| pending.len())
            .unwrap_or(0);
        if unprocessed > 0 {
            return Err(StoreError::Unprocessed(unprocessed));
        }

        Ok(())
    }

    async fn health_check(&self) -> bool {
        self.client.health_check().await
    }
}
