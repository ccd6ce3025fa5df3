//! Repository pattern implementations
//!
//! Data access objects over the persisted store.

pub mod rate;

pub use rate::{RateError, RateRepository, DEFAULT_RECORD_TTL_DAYS};
