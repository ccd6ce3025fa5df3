//! Rate providers
//!
//! The external source of live exchange rates. Providers are unreliable by
//! nature; callers treat their errors as non-fatal to any larger operation.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

use crate::db::models::partition_key;

// ============================================================================
// Constants
// ============================================================================

pub const DEFAULT_RATE_API_BASE: &str = "https://api.exchangerate.host";

pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur when fetching a rate
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Rate API returned non-success status: {0}")]
    Status(u16),

    #[error("Invalid rate API response: {0}")]
    InvalidResponse(String),

    #[error("Unsupported currency pair: {from} to {to}")]
    UnsupportedPair { from: String, to: String },

    #[error("Rate fetch timed out after {0:?}")]
    Timeout(Duration),
}

// ============================================================================
// Provider trait
// ============================================================================

/// Source of live exchange rates.
///
/// Implementations apply their own request timeout.
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;

    async fn fetch_rate(&self, from: &str, to: &str, date: &str) -> Result<f64, ProviderError>;
}

// ============================================================================
// HTTP provider
// ============================================================================

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default = "default_success")]
    success: bool,
    rate: Option<f64>,
}

fn default_success() -> bool {
    true
}

/// Provider backed by an exchangerate.host-style REST API:
/// `GET {base_url}/{date}?from={from}&to={to}`
#[derive(Clone)]
pub struct ExchangeRateApi {
    client: Client,
    base_url: String,
}

impl ExchangeRateApi {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn rate_url(&self, date: &str) -> String {
        format!("{}/{}", self.base_url, date)
    }
}

#[async_trait]
impl RateProvider for ExchangeRateApi {
    fn name(&self) -> &str {
        "exchangerate-api"
    }

    async fn fetch_rate(&self, from: &str, to: &str, date: &str) -> Result<f64, ProviderError> {
        let response = self
            .client
            .get(self.rate_url(date))
            .query(&[("from", from), ("to", to)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status(status.as_u16()));
        }

        let body: ApiResponse = response.json().await?;
        if !body.success {
            return Err(ProviderError::InvalidResponse(
                "provider reported success=false".to_string(),
            ));
        }

        let rate = body
            .rate
            .ok_or_else(|| ProviderError::InvalidResponse("missing rate".to_string()))?;

        tracing::debug!(from = %from, to = %to, date = %date, rate = rate, "Fetched rate from API");
        Ok(rate)
    }
}

// ============================================================================
// Static provider
// ============================================================================

/// Provider answering from a fixed rate table, keyed `FROM#TO`.
///
/// The rate is the same for every date.
#[derive(Debug, Clone)]
pub struct StaticRateProvider {
    rates: HashMap<String, f64>,
}

impl StaticRateProvider {
    pub fn new(rates: HashMap<String, f64>) -> Self {
        Self { rates }
    }

    /// Sample rates for local development
    pub fn with_sample_rates() -> Self {
        let rates = [
            ("USD", "INR", 83.12),
            ("USD", "EUR", 0.93),
            ("USD", "JPY", 155.42),
            ("INR", "USD", 0.012),
            ("INR", "EUR", 0.011),
            ("INR", "JPY", 1.87),
            ("EUR", "USD", 1.07),
            ("EUR", "INR", 89.31),
            ("EUR", "JPY", 166.94),
            ("JPY", "USD", 0.0064),
            ("JPY", "INR", 0.53),
            ("JPY", "EUR", 0.0060),
            ("AUD", "USD", 0.66),
            ("USD", "AUD", 1.51),
            ("GBP", "USD", 1.27),
            ("USD", "GBP", 0.79),
            ("CAD", "INR", 61.23),
            ("INR", "CAD", 0.016),
            ("CHF", "USD", 1.12),
            ("USD", "CHF", 0.89),
        ]
        .into_iter()
        .map(|(from, to, rate)| (partition_key(from, to), rate))
        .collect();

        Self { rates }
    }
}

#[async_trait]
impl RateProvider for StaticRateProvider {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch_rate(&self, from: &str, to: &str, _date: &str) -> Result<f64, ProviderError> {
        self.rates
            .get(&partition_key(from, to))
            .copied()
            .ok_or_else(|| ProviderError::UnsupportedPair {
                from: from.to_string(),
                to: to.to_string(),
            })
    }
}
