//! Services module
//!
//! Currency use cases and the external rate providers behind them.

pub mod currency;
pub mod provider;

pub use currency::{today, Conversion, CurrencyService, ExchangeRate};
pub use provider::{ExchangeRateApi, ProviderError, RateProvider, StaticRateProvider};
