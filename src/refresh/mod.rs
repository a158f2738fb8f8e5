//! Rule refresh - keep an in-memory rule snapshot in sync with the store.
//!
//! Provides two refresh mechanisms:
//! 1. **On-demand refresh** (RefreshService): one synchronous reload
//! 2. **Scheduled refresh** (RefreshScheduler): periodic background task
//!
//! [`RuleCache`] combines both behind the read API used on the job hot path.

pub mod cache;
pub mod scheduler;
pub mod service;

pub use cache::RuleCache;
pub use scheduler::{RefreshScheduler, SchedulerConfig, DEFAULT_REFRESH_RATE};
pub use service::{RefreshService, RefreshStats, Snapshot};
