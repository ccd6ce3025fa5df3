//! Exchange rate service library

// Public modules
pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod middleware;
pub mod server;
pub mod services;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use config::Settings;
pub use error::ApiError;
pub use server::App;
