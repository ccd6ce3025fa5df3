//! Currency use cases
//!
//! Exchange-rate lookups and conversions on top of the rate repository.

use chrono::Utc;
use serde::Serialize;

use crate::db::models::DATE_FORMAT;
use crate::db::{RateError, RateRepository};

/// A resolved exchange rate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExchangeRate {
    pub from: String,
    pub to: String,
    pub date: String,
    pub rate: f64,
}

/// A converted amount
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conversion {
    pub from: String,
    pub to: String,
    pub amount: f64,
    pub date: String,
    pub converted_amount: f64,
}

/// Today's date in UTC, as stored
pub fn today() -> String {
    Utc::now().format(DATE_FORMAT).to_string()
}

#[derive(Clone)]
pub struct CurrencyService {
    repository: RateRepository,
}

impl CurrencyService {
    pub fn new(repository: RateRepository) -> Self {
        Self { repository }
    }

    /// Rate for `from`/`to` on `date`, with an empty date meaning today
    pub async fn get_exchange_rate(&self, from: &str, to: &str, date: &str) -> Result<ExchangeRate, RateError> {
        let date = resolve_date(date);

        let rate = if from == to {
            1.0
        } else {
            self.repository.get_rate(from, to, &date).await?
        };

        Ok(ExchangeRate {
            from: from.to_string(),
            to: to.to_string(),
            date,
            rate,
        })
    }

    pub async fn get_converted_currency(
        &self,
        from: &str,
        to: &str,
        date: &str,
        amount: f64,
    ) -> Result<Conversion, RateError> {
        let ExchangeRate { from, to, date, rate } = self.get_exchange_rate(from, to, date).await?;

        Ok(Conversion {
            from,
            to,
            amount,
            date,
            converted_amount: amount * rate,
        })
    }
}

fn resolve_date(date: &str) -> String {
    if date.is_empty() {
        today()
    } else {
        date.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::RateCache;
    use crate::testing::{Harness, ScriptedProvider};

    #[tokio::test]
    async fn test_same_currency_is_one_without_lookups() {
        let harness = Harness::new(ScriptedProvider::new());
        harness.store.set_fail_reads(true);
        let service = CurrencyService::new(harness.repository.clone());

        let rate = service.get_exchange_rate("USD", "USD", "2024-01-01").await.unwrap();
        assert_eq!(rate.rate, 1.0);
        assert_eq!(rate.date, "2024-01-01");
        assert_eq!(harness.provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_conversion_with_todays_stored_rate() {
        let harness = Harness::new(ScriptedProvider::new());
        let today = today();
        harness.repository.save_rate("USD", "INR", &today, 83.12).await.unwrap();
        harness.cache.delete(&format!("USD#INR#{}", today)).await;
        let service = CurrencyService::new(harness.repository.clone());

        let conversion = service.get_converted_currency("USD", "INR", "", 100.0).await.unwrap();

        assert!((conversion.converted_amount - 8312.0).abs() < 1e-9);
        assert_eq!(conversion.date, today);
        assert_eq!(conversion.amount, 100.0);
        assert_eq!(harness.provider.calls(), 0);
        assert!(harness.store.len().await >= 1);
    }

    #[tokio::test]
    async fn test_explicit_date_reaches_provider() {
        let harness = Harness::new(ScriptedProvider::new().with_rate("EUR", "USD", 1.07));
        let service = CurrencyService::new(harness.repository.clone());

        let rate = service.get_exchange_rate("EUR", "USD", "2024-03-01").await.unwrap();
        assert_eq!(rate.rate, 1.07);
        assert_eq!(harness.cache.get("EUR#USD#2024-03-01").await, Some(1.07));
        assert_eq!(harness.provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_lookup_failure_is_returned() {
        let harness = Harness::new(ScriptedProvider::new().failing("USD", "GBP"));
        let service = CurrencyService::new(harness.repository.clone());

        assert!(service.get_converted_currency("USD", "GBP", "", 10.0).await.is_err());
    }
}
