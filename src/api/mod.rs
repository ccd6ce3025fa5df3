//! API endpoint handlers module
//!
//! Contains all HTTP endpoint handler implementations.

pub mod currency;
pub mod health;
