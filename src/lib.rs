//! # Antidote
//!
//! Operator-declared inhibition rules for background jobs. A rule pairs a
//! display class pattern with a treatment (`skip`, `kill`, `suspend`); the job
//! pipeline asks the rule cache for a match before running each job.
//!
//! ## Architecture
//! - [`pattern`]: glob-like class patterns compiled to a small matcher
//! - [`rule_store`]: rules persisted in one shared hash, self-healing reads
//! - [`refresh`]: eventually consistent in-memory snapshot, refreshed on a timer
//! - [`suspension`]: per-rule holding queues for suspended jobs
//! - [`telemetry`]: batched per-minute hit counters
//! - [`Antidote`]: context object tying the pieces together

pub mod antidote;
pub mod config;
pub mod error;
pub mod job;
pub mod pattern;
pub mod refresh;
pub mod rule;
pub mod rule_store;
pub mod storage;
pub mod suspension;
pub mod telemetry;
pub mod types;

pub use antidote::Antidote;
pub use config::AntidoteConfig;
pub use error::{AntidoteError, PatternError, Result, StoreError};
pub use job::JobRecord;
pub use pattern::Pattern;
pub use refresh::{RefreshStats, RuleCache, SchedulerConfig};
pub use rule::Rule;
pub use rule_store::{IdSource, RandomIds, RuleStore};
pub use storage::{KeyValueStore, Keyspace, MemoryStore};
#[cfg(feature = "redis")]
pub use storage::RedisStore;
pub use suspension::SuspensionQueue;
pub use telemetry::{MetricsAggregator, TelemetryConfig};
pub use types::Treatment;
