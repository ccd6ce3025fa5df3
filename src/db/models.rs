//! DynamoDB data models
//!
//! This module defines the exchange-rate facts, their key scheme and the
//! item shapes stored in DynamoDB.

use aws_sdk_dynamodb::types::AttributeValue;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A raw DynamoDB item
pub type Item = HashMap<String, AttributeValue>;

// ============================================================================
// Attribute names and key scheme
// ============================================================================

pub const PARTITION_KEY: &str = "pk";
pub const SORT_KEY: &str = "sk";
pub const RATE: &str = "rate";
pub const UPDATED_AT: &str = "updated_at";
pub const TTL: &str = "ttl";
pub const EXPIRES_AT: &str = "expires_at";

/// Sort key used for lock records, which only need the partition key
pub const LOCK_SORT_KEY: &str = "LOCK";

/// Separator for composite keys. Must never appear inside a currency code or date.
pub const KEY_DELIMITER: char = '#';

/// Calendar date layout used in keys and requests
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Build the partition key for a currency pair (`FROM#TO`)
pub fn partition_key(from: &str, to: &str) -> String {
    format!("{}{}{}", from, KEY_DELIMITER, to)
}

/// Build the cache key for a rate fact (`FROM#TO#DATE`)
pub fn cache_key(from: &str, to: &str, date: &str) -> String {
    format!("{}{}{}{}{}", from, KEY_DELIMITER, to, KEY_DELIMITER, date)
}

/// Split a partition key back into `(from, to)`
pub fn split_partition_key(pk: &str) -> Option<(&str, &str)> {
    let mut parts = pk.split(KEY_DELIMITER);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(from), Some(to), None) => Some((from, to)),
        _ => None,
    }
}

/// Parse a cache key into `(from, to, date)`.
///
/// Returns `None` unless the key has exactly three segments and the last one
/// is a valid calendar date.
pub fn parse_cache_key(key: &str) -> Option<(&str, &str, NaiveDate)> {
    let mut parts = key.split(KEY_DELIMITER);
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(from), Some(to), Some(date), None) => {
            let date = NaiveDate::parse_from_str(date, DATE_FORMAT).ok()?;
            Some((from, to, date))
        }
        _ => None,
    }
}

/// Parse a `%Y-%m-%d` date string
pub fn parse_date(date: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(date, DATE_FORMAT).ok()
}

/// Start of the given day in UTC
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

// ============================================================================
// Rate facts
// ============================================================================

/// Identifies one exchange-rate fact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RateKeyRequest {
    /// Source currency code
    pub from: String,

    /// Target currency code
    pub to: String,

    /// Calendar date (`%Y-%m-%d`)
    pub date: String,
}

impl RateKeyRequest {
    pub fn new(from: impl Into<String>, to: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            date: date.into(),
        }
    }

    pub fn cache_key(&self) -> String {
        cache_key(&self.from, &self.to, &self.date)
    }

    pub fn partition_key(&self) -> String {
        partition_key(&self.from, &self.to)
    }
}

impl std::fmt::Display for RateKeyRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}->{}@{}", self.from, self.to, self.date)
    }
}

/// A resolved exchange-rate fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateKey {
    #[serde(flatten)]
    pub request: RateKeyRequest,

    /// Units of `to` per unit of `from`
    pub rate: f64,
}

impl RateKey {
    pub fn new(request: RateKeyRequest, rate: f64) -> Self {
        Self { request, rate }
    }

    pub fn cache_key(&self) -> String {
        self.request.cache_key()
    }
}

// ============================================================================
// Stored records
// ============================================================================

/// Rate record as stored in the rates table.
///
/// `pk` is `FROM#TO`, `sk` is the date. `ttl` drives DynamoDB's own
/// retention and is independent of the in-memory cache's expiry.
#[derive(Debug, Clone, PartialEq)]
pub struct RateRecord {
    pub from: String,
    pub to: String,
    pub date: String,
    pub rate: f64,

    /// Unix timestamp of the last write
    pub updated_at: i64,

    /// Unix timestamp after which DynamoDB may expire the item
    pub ttl: Option<i64>,
}

impl RateRecord {
    /// Build a record for a fact, expiring `retention` after the fact's date.
    ///
    /// An unparseable date produces a record without a `ttl` attribute.
    pub fn new(fact: &RateKey, updated_at: DateTime<Utc>, retention: Duration) -> Self {
        let ttl = parse_date(&fact.request.date)
            .map(|date| (start_of_day(date) + retention).timestamp());

        Self {
            from: fact.request.from.clone(),
            to: fact.request.to.clone(),
            date: fact.request.date.clone(),
            rate: fact.rate,
            updated_at: updated_at.timestamp(),
            ttl,
        }
    }

    /// Convert to DynamoDB item
    pub fn to_dynamodb(&self) -> Item {
        let mut item = HashMap::new();
        item.insert(
            PARTITION_KEY.to_string(),
            AttributeValue::S(partition_key(&self.from, &self.to)),
        );
        item.insert(SORT_KEY.to_string(), AttributeValue::S(self.date.clone()));
        item.insert(RATE.to_string(), AttributeValue::N(self.rate.to_string()));
        item.insert(UPDATED_AT.to_string(), AttributeValue::N(self.updated_at.to_string()));

        if let Some(ttl) = self.ttl {
            item.insert(TTL.to_string(), AttributeValue::N(ttl.to_string()));
        }

        item
    }

    /// Parse from DynamoDB item
    pub fn from_dynamodb(item: &Item) -> Option<Self> {
        let pk = get_string(item, PARTITION_KEY)?;
        let (from, to) = split_partition_key(&pk)?;

        Some(Self {
            from: from.to_string(),
            to: to.to_string(),
            date: get_string(item, SORT_KEY)?,
            rate: get_number_f64(item, RATE)?,
            updated_at: get_number(item, UPDATED_AT).unwrap_or(0),
            ttl: get_number(item, TTL),
        })
    }

    pub fn into_rate_key(self) -> RateKey {
        RateKey::new(RateKeyRequest::new(self.from, self.to, self.date), self.rate)
    }
}

/// Lock record for cross-process mutual exclusion.
///
/// Exists only while held; a record whose `expires_at` has passed is free.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRecord {
    pub lock_id: String,

    /// Unix timestamp at which the lock is released
    pub expires_at: i64,
}

impl LockRecord {
    /// Convert to DynamoDB item
    pub fn to_dynamodb(&self) -> Item {
        let mut item = HashMap::new();
        item.insert(PARTITION_KEY.to_string(), AttributeValue::S(self.lock_id.clone()));
        item.insert(SORT_KEY.to_string(), AttributeValue::S(LOCK_SORT_KEY.to_string()));
        item.insert(EXPIRES_AT.to_string(), AttributeValue::N(self.expires_at.to_string()));
        item
    }

    /// Parse from DynamoDB item
    pub fn from_dynamodb(item: &Item) -> Option<Self> {
        Some(Self {
            lock_id: get_string(item, PARTITION_KEY)?,
            expires_at: get_number(item, EXPIRES_AT)?,
        })
    }
}

// Helper functions for parsing DynamoDB AttributeValues

pub(crate) fn get_string(item: &Item, key: &str) -> Option<String> {
    item.get(key).and_then(|v| v.as_s().ok()).map(|s| s.to_string())
}

pub(crate) fn get_number(item: &Item, key: &str) -> Option<i64> {
    item.get(key)
        .and_then(|v| v.as_n().ok())
        .and_then(|n| n.parse().ok())
}

fn get_number_f64(item: &Item, key: &str) -> Option<f64> {
    item.get(key)
        .and_then(|v| v.as_n().ok())
        .and_then(|n| n.parse().ok())
}
