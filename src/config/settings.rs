//! Application settings and configuration
//!
//! This module provides configuration management for the application,
//! loading settings from environment variables with sensible defaults.

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::db::models::{RateKeyRequest, KEY_DELIMITER};

/// Application environment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    #[value(alias = "dev")]
    Development,
    #[value(alias = "stage")]
    Staging,
    #[value(alias = "prod")]
    Production,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Staging => write!(f, "staging"),
            Environment::Production => write!(f, "production"),
        }
    }
}

impl FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" | "stage" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            _ => anyhow::bail!("Invalid environment: {}. Expected: development, staging, or production", s),
        }
    }
}

/// Where exchange rates are persisted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    DynamoDb,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dynamodb" | "dynamo" => Ok(StoreBackend::DynamoDb),
            "memory" | "in-memory" => Ok(StoreBackend::Memory),
            _ => anyhow::bail!("Invalid STORE_BACKEND: {}. Expected: dynamodb or memory", s),
        }
    }
}

/// Which rate provider answers cache and store misses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Http,
    Static,
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "http" | "api" => Ok(ProviderKind::Http),
            "static" | "mock" => Ok(ProviderKind::Static),
            _ => anyhow::bail!("Invalid RATE_PROVIDER: {}. Expected: http or static", s),
        }
    }
}

/// A configured `FROM:TO` currency pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct CurrencyPair {
    pub from: String,
    pub to: String,
}

impl CurrencyPair {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    /// The store key for this pair on `date`
    pub fn on(&self, date: &str) -> RateKeyRequest {
        RateKeyRequest::new(self.from.clone(), self.to.clone(), date)
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.from, self.to)
    }
}

impl FromStr for CurrencyPair {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (from, to) = s
            .split_once(':')
            .with_context(|| format!("Invalid currency pair '{}', expected FROM:TO", s))?;
        let (from, to) = (from.trim().to_uppercase(), to.trim().to_uppercase());

        if from.is_empty() || to.is_empty() || to.contains(':') {
            anyhow::bail!("Invalid currency pair '{}', expected FROM:TO", s);
        }
        check_currency_code(&from)?;
        check_currency_code(&to)?;

        Ok(Self { from, to })
    }
}

/// Background job configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobsConfig {
    pub refresher_enabled: bool,
    pub refresh_interval_seconds: u64,
    pub lock_ttl_seconds: u64,
    pub refresh_lock_id: String,
    pub cleaner_enabled: bool,
    pub cleaner_interval_seconds: u64,
}

impl JobsConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_seconds)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_seconds)
    }

    pub fn cleaner_interval(&self) -> Duration {
        Duration::from_secs(self.cleaner_interval_seconds)
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            refresher_enabled: true,
            refresh_interval_seconds: 30 * 60,
            lock_ttl_seconds: 25 * 60,
            refresh_lock_id: "rate_refresher_lock".to_string(),
            cleaner_enabled: true,
            cleaner_interval_seconds: 24 * 60 * 60,
        }
    }
}

pub const DEFAULT_SUPPORTED_CURRENCIES: &str = "USD,INR,EUR,JPY,GBP";

pub const DEFAULT_CURRENCY_PAIRS: &str = "USD:INR,USD:EUR,USD:GBP,USD:JPY,USD:CAD,USD:AUD,\
EUR:INR,EUR:USD,EUR:GBP,EUR:JPY,GBP:USD,GBP:INR,GBP:EUR,INR:USD,INR:EUR,INR:GBP,\
JPY:USD,JPY:EUR,CAD:USD,AUD:USD";

/// Main application settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    // App settings
    pub app_name: String,
    pub app_version: String,
    pub environment: Environment,
    pub log_level: String,

    // Server settings
    pub host: String,
    pub port: u16,

    // AWS settings
    pub aws_region: String,
    pub dynamodb_endpoint_url: Option<String>,

    // Persistence
    pub store_backend: StoreBackend,
    pub dynamodb_rates_table: String,
    pub dynamodb_lock_table: String,
    pub record_ttl_days: i64,
    pub batch_write_size: usize,

    // Rate provider
    pub rate_provider: ProviderKind,
    pub rate_api_base_url: String,
    pub provider_timeout_seconds: u64,

    // Currencies
    pub supported_currencies: Vec<String>,
    pub currency_pairs: Vec<CurrencyPair>,

    // Local cache
    pub cache_retention_days: i64,

    // Background jobs
    pub jobs: JobsConfig,
}

impl Settings {
    /// Load settings from environment variables with defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists (ignored in production typically)
        dotenvy::dotenv().ok();

        let rates_table = env_or_default("DYNAMODB_RATES_TABLE", "exchange_rates");
        let defaults = JobsConfig::default();

        let settings = Self {
            // App settings
            app_name: env_or_default("APP_NAME", "exchange-rate-service"),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: env_or_default("ENVIRONMENT", "development")
                .parse()
                .unwrap_or_default(),
            log_level: env_or_default("LOG_LEVEL", "info"),

            // Server settings
            host: env_or_default("HOST", "0.0.0.0"),
            port: env_or_default("PORT", "8000")
                .parse()
                .context("Invalid PORT value")?,

            // AWS settings
            aws_region: env_or_default("AWS_REGION", "us-east-1"),
            dynamodb_endpoint_url: env::var("DYNAMODB_ENDPOINT_URL").ok(),

            // Persistence
            store_backend: env_or_default("STORE_BACKEND", "dynamodb").parse()?,
            dynamodb_lock_table: env_or_default("DYNAMODB_LOCK_TABLE", &rates_table),
            dynamodb_rates_table: rates_table,
            record_ttl_days: env_parse("RECORD_TTL_DAYS", 90)?,
            batch_write_size: env_parse("BATCH_WRITE_SIZE", 25)?,

            // Rate provider
            rate_provider: env_or_default("RATE_PROVIDER", "http").parse()?,
            rate_api_base_url: env_or_default(
                "RATE_API_BASE_URL",
                crate::services::provider::DEFAULT_RATE_API_BASE,
            ),
            provider_timeout_seconds: env_parse("PROVIDER_TIMEOUT_SECONDS", 5)?,

            // Currencies
            supported_currencies: parse_currencies(&env_or_default(
                "SUPPORTED_CURRENCIES",
                DEFAULT_SUPPORTED_CURRENCIES,
            ))?,
            currency_pairs: parse_pairs(&env_or_default("CURRENCY_PAIRS", DEFAULT_CURRENCY_PAIRS))?,

            // Local cache
            cache_retention_days: env_parse("CACHE_RETENTION_DAYS", 90)?,

            // Background jobs
            jobs: JobsConfig {
                refresher_enabled: env_parse("REFRESHER_ENABLED", defaults.refresher_enabled)?,
                refresh_interval_seconds: env_parse(
                    "REFRESH_INTERVAL_SECONDS",
                    defaults.refresh_interval_seconds,
                )?,
                lock_ttl_seconds: env_parse("LOCK_TTL_SECONDS", defaults.lock_ttl_seconds)?,
                refresh_lock_id: env_or_default("REFRESH_LOCK_ID", &defaults.refresh_lock_id),
                cleaner_enabled: env_parse("CLEANER_ENABLED", defaults.cleaner_enabled)?,
                cleaner_interval_seconds: env_parse(
                    "CLEANER_INTERVAL_SECONDS",
                    defaults.cleaner_interval_seconds,
                )?,
            },
        };

        // Validate settings
        settings.validate()?;

        Ok(settings)
    }

    /// Validate settings
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("Port cannot be 0");
        }

        if !(1..=crate::db::store::MAX_BATCH_WRITE_ITEMS).contains(&self.batch_write_size) {
            anyhow::bail!(
                "BATCH_WRITE_SIZE must be between 1 and {}",
                crate::db::store::MAX_BATCH_WRITE_ITEMS
            );
        }

        if self.provider_timeout_seconds == 0 {
            anyhow::bail!("PROVIDER_TIMEOUT_SECONDS must be > 0");
        }

        if self.cache_retention_days <= 0 || self.record_ttl_days <= 0 {
            anyhow::bail!("Retention windows must be > 0 days");
        }

        if self.supported_currencies.is_empty() {
            anyhow::bail!("SUPPORTED_CURRENCIES cannot be empty");
        }

        // The lock must lapse before the next tick so a new leader can be elected
        if self.jobs.refresher_enabled {
            if self.jobs.refresh_interval_seconds == 0 || self.jobs.lock_ttl_seconds == 0 {
                anyhow::bail!("Refresh interval and lock TTL must be > 0");
            }
            if self.jobs.lock_ttl_seconds >= self.jobs.refresh_interval_seconds {
                anyhow::bail!(
                    "LOCK_TTL_SECONDS ({}) must be shorter than REFRESH_INTERVAL_SECONDS ({})",
                    self.jobs.lock_ttl_seconds,
                    self.jobs.refresh_interval_seconds
                );
            }
            if self.jobs.refresh_lock_id.is_empty() {
                anyhow::bail!("REFRESH_LOCK_ID cannot be empty");
            }
        }

        if self.jobs.cleaner_enabled && self.jobs.cleaner_interval_seconds == 0 {
            anyhow::bail!("CLEANER_INTERVAL_SECONDS must be > 0");
        }

        if self.environment == Environment::Production && self.store_backend == StoreBackend::Memory {
            tracing::warn!("Running in production with the in-memory store; rates are not shared");
        }

        Ok(())
    }

    /// Get the server address string
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_seconds)
    }

    pub fn is_supported_currency(&self, code: &str) -> bool {
        self.supported_currencies.iter().any(|c| c == code)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: "exchange-rate-service".to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: Environment::Development,
            log_level: "info".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8000,
            aws_region: "us-east-1".to_string(),
            dynamodb_endpoint_url: None,
            store_backend: StoreBackend::DynamoDb,
            dynamodb_rates_table: "exchange_rates".to_string(),
            dynamodb_lock_table: "exchange_rates".to_string(),
            record_ttl_days: 90,
            batch_write_size: 25,
            rate_provider: ProviderKind::Http,
            rate_api_base_url: crate::services::provider::DEFAULT_RATE_API_BASE.to_string(),
            provider_timeout_seconds: 5,
            supported_currencies: parse_currencies(DEFAULT_SUPPORTED_CURRENCIES).unwrap_or_default(),
            currency_pairs: parse_pairs(DEFAULT_CURRENCY_PAIRS).unwrap_or_default(),
            cache_retention_days: 90,
            jobs: JobsConfig::default(),
        }
    }
}

/// Helper function to get environment variable with default
fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, falling back to `default` when unset
fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid {} value '{}': {}", key, raw, e)),
        Err(_) => Ok(default),
    }
}

/// Currency codes end up inside store and cache keys
fn check_currency_code(code: &str) -> Result<()> {
    if code.contains(KEY_DELIMITER) {
        anyhow::bail!(
            "Invalid currency code '{}', must not contain '{}'",
            code,
            KEY_DELIMITER
        );
    }
    Ok(())
}

fn parse_currencies(raw: &str) -> Result<Vec<String>> {
    raw.split(',')
        .map(|c| c.trim().to_uppercase())
        .filter(|c| !c.is_empty())
        .map(|c| check_currency_code(&c).map(|_| c))
        .collect()
}

fn parse_pairs(raw: &str) -> Result<Vec<CurrencyPair>> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::parse)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.app_name, "exchange-rate-service");
        assert_eq!(settings.port, 8000);
        assert_eq!(settings.dynamodb_rates_table, "exchange_rates");
        assert_eq!(settings.dynamodb_lock_table, "exchange_rates");
        assert_eq!(settings.currency_pairs.len(), 20);
        assert_eq!(settings.supported_currencies, vec!["USD", "INR", "EUR", "JPY", "GBP"]);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_environment_parsing() {
        assert_eq!("development".parse::<Environment>().unwrap(), Environment::Development);
        assert_eq!("dev".parse::<Environment>().unwrap(), Environment::Development);
        assert_eq!("production".parse::<Environment>().unwrap(), Environment::Production);
        assert_eq!("prod".parse::<Environment>().unwrap(), Environment::Production);
        assert!("qa".parse::<Environment>().is_err());
    }

    #[test]
    fn test_pair_parsing() {
        let pair: CurrencyPair = " usd:inr ".trim().parse().unwrap();
        assert_eq!(pair, CurrencyPair::new("USD", "INR"));
        assert_eq!(pair.to_string(), "USD:INR");
        assert_eq!(pair.on("2024-01-01").cache_key(), "USD#INR#2024-01-01");

        assert!("USDINR".parse::<CurrencyPair>().is_err());
        assert!("USD:".parse::<CurrencyPair>().is_err());
        assert!("USD:INR:EUR".parse::<CurrencyPair>().is_err());

        let pairs = parse_pairs("USD:INR, EUR:USD,").unwrap();
        assert_eq!(pairs.len(), 2);
        assert!(parse_pairs("USD:INR,bad").is_err());
    }

    #[test]
    fn test_key_delimiter_is_rejected_in_codes() {
        assert!("U#S:INR".parse::<CurrencyPair>().is_err());
        assert!("USD:IN#R".parse::<CurrencyPair>().is_err());
        assert!(parse_pairs("USD:INR,U#S:EUR").is_err());

        assert_eq!(parse_currencies("usd, inr").unwrap(), vec!["USD", "INR"]);
        assert!(parse_currencies("USD,E#UR").is_err());
    }

    #[test]
    fn test_lock_ttl_must_be_shorter_than_interval() {
        let mut settings = Settings::default();
        settings.jobs.lock_ttl_seconds = settings.jobs.refresh_interval_seconds;
        assert!(settings.validate().is_err());

        settings.jobs.refresher_enabled = false;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_batch_write_size_bounds() {
        let mut settings = Settings::default();
        settings.batch_write_size = 0;
        assert!(settings.validate().is_err());
        settings.batch_write_size = 26;
        assert!(settings.validate().is_err());
        settings.batch_write_size = 10;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_backend_parsing() {
        assert_eq!("memory".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert_eq!("DynamoDB".parse::<StoreBackend>().unwrap(), StoreBackend::DynamoDb);
        assert_eq!("static".parse::<ProviderKind>().unwrap(), ProviderKind::Static);
        assert!("redis".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn test_server_addr() {
        let settings = Settings::default();
        assert_eq!(settings.server_addr(), "0.0.0.0:8000");
    }
}
