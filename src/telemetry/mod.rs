//! # Telemetry Module - inhibition hit metrics
//!
//! Counts how often each job class was inhibited by each treatment and
//! persists the counts in per-minute buckets that expire after 8 hours.

pub mod recorder;
pub mod writer;

pub use recorder::{MetricsAggregator, TelemetryConfig, DEFAULT_FLUSH_INTERVAL};
pub use writer::{bucket_field, bucket_key, BucketWriter, BUCKET_TTL};
