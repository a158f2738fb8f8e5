//! # Bucket Writer
//!
//! Persists aggregated hit counts into per-minute bucket records.
//!
//! ```text
//! key:    i|<YYYYMMDD>|<H>:<M>     (UTC, hour/minute not zero padded)
//! field:  <job class>|<treatment>
//! value:  integer, incremented
//! expiry: 8 hours, reset on every write
//! ```

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::error::StoreError;
use crate::storage::KeyValueStore;
use crate::types::Treatment;

/// Lifetime of a bucket after its last write.
pub const BUCKET_TTL: Duration = Duration::from_secs(8 * 60 * 60);

/// Bucket key for the minute containing `at`.
pub fn bucket_key(at: DateTime<Utc>) -> String {
    format!("i|{}", at.format("%Y%m%d|%-H:%-M"))
}

/// Field name inside a bucket.
pub fn bucket_field(job_class: &str, treatment: Treatment) -> String {
    format!("{}|{}", job_class, treatment)
}

/// Writes counter increments to the backend.
#[derive(Clone)]
pub struct BucketWriter {
    backend: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl BucketWriter {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self {
            backend,
            ttl: BUCKET_TTL,
        }
    }

    /// Increments every non-zero count in the bucket for `at`.
    ///
    /// Returns the number of fields written; writes nothing when all counts
    /// are zero.
    pub fn write<I>(&self, at: DateTime<Utc>, counts: I) -> Result<usize, StoreError>
    where
        I: IntoIterator<Item = ((String, Treatment), u64)>,
    {
        let increments: Vec<(String, i64)> = counts
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .map(|((job_class, treatment), count)| {
                (bucket_field(&job_class, treatment), count as i64)
            })
            .collect();

        if increments.is_empty() {
            return Ok(0);
        }

        self.backend
            .hincrby_batch(&bucket_key(at), &increments, self.ttl)?;
        Ok(increments.len())
    }
}
