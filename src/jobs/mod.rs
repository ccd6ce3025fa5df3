//! Background jobs
//!
//! - `rate_refresher`: refreshes today's rates across the fleet every 30 minutes
//! - `cache_cleaner`: evicts cached rates older than the retention window daily
//!
//! Both run on [`scheduler::spawn_periodic`] and stop with the server.

pub mod cache_cleaner;
pub mod rate_refresher;
pub mod scheduler;

pub use cache_cleaner::CacheCleaner;
pub use rate_refresher::{RateRefresher, TickOutcome, DEFAULT_LOCK_ID};
pub use scheduler::{spawn_periodic, Job, JobHandle};
