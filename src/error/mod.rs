//! Error types surfaced at the HTTP edge

pub mod types;

pub use types::ApiError;
