//! # Metrics Aggregator
//!
//! Thread-safe hit counting with batched persistence. Tracking only touches
//! process memory; `flush` moves the accumulated counts into the current
//! minute's bucket.

use chrono::{DateTime, Utc};
use log::{debug, error, info};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::mem;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use super::writer::BucketWriter;
use crate::error::{AntidoteError, Result};
use crate::refresh::scheduler::validate_interval;
use crate::storage::KeyValueStore;
use crate::types::Treatment;

type Counters = HashMap<(String, Treatment), u64>;

/// Default period of the background flusher.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(10);

/// Configuration for hit tracking
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Enable hit tracking
    pub enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        TelemetryConfig { enabled: true }
    }
}

/// In-memory `(job class, treatment) -> hits` counters.
pub struct MetricsAggregator {
    config: TelemetryConfig,
    counters: Mutex<Counters>,
    writer: BucketWriter,
}

impl MetricsAggregator {
    pub fn new(backend: Arc<dyn KeyValueStore>, config: TelemetryConfig) -> Self {
        Self {
            config,
            counters: Mutex::new(HashMap::new()),
            writer: BucketWriter::new(backend),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Counts one hit.
    pub fn track(&self, treatment: Treatment, job_class: &str) {
        if !self.config.enabled {
            return;
        }
        *self
            .counters
            .lock()
            .entry((job_class.to_string(), treatment))
            .or_insert(0) += 1;
    }

    /// Hits tracked since the last flush.
    pub fn pending(&self, treatment: Treatment, job_class: &str) -> u64 {
        self.counters
            .lock()
            .get(&(job_class.to_string(), treatment))
            .copied()
            .unwrap_or(0)
    }

    /// Flushes into the bucket for the current minute.
    pub fn flush_now(&self) -> Result<usize> {
        self.flush(Utc::now())
    }

    /// Swaps out the counters and persists them into the bucket for `at`.
    ///
    /// Hits tracked concurrently land in either the swapped-out map or the
    /// fresh one, never both. If the write fails the swapped-out counts are
    /// dropped.
    pub fn flush(&self, at: DateTime<Utc>) -> Result<usize> {
        let counters = mem::take(&mut *self.counters.lock());
        if counters.is_empty() {
            return Ok(0);
        }

        let written = self.writer.write(at, counters)?;
        debug!("flushed {} hit counters", written);
        Ok(written)
    }

    /// Spawns a task on the current tokio runtime that flushes every
    /// `period`. Flush failures are logged.
    ///
    /// Fails on a zero period or when called outside a tokio runtime.
    pub fn spawn_flusher(self: &Arc<Self>, period: Duration) -> Result<JoinHandle<()>> {
        validate_interval(period)?;
        let runtime = Handle::try_current().map_err(|_| {
            AntidoteError::Validation("cannot start metrics flusher: no tokio runtime".to_string())
        })?;
        let aggregator = Arc::clone(self);
        info!("starting metrics flusher with {:.3}-second interval", period.as_secs_f64());

        Ok(runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let agg = aggregator.clone();
                match tokio::task::spawn_blocking(move || agg.flush_now()).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => error!("metrics flush failed: {}", e),
                    Err(e) => error!("metrics flush task aborted: {}", e),
                }
            }
        }))
    }
}
