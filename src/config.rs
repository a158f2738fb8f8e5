//! Runtime configuration.
//!
//! Defaults suit a single shared backend; every field can be overridden from
//! the environment:
//!
//! | Variable                          | Field                    |
//! |-----------------------------------|--------------------------|
//! | `ANTIDOTE_NAMESPACE`              | `namespace`              |
//! | `ANTIDOTE_REFRESH_RATE`           | `refresh_interval` (s)   |
//! | `ANTIDOTE_METRICS_FLUSH_INTERVAL` | `metrics_flush_interval` |

use std::time::Duration;

use crate::error::{AntidoteError, Result};
use crate::refresh::scheduler::{validate_interval, validate_refresh_rate, DEFAULT_REFRESH_RATE};
use crate::refresh::SchedulerConfig;
use crate::storage::{Keyspace, DEFAULT_NAMESPACE};
use crate::telemetry::{TelemetryConfig, DEFAULT_FLUSH_INTERVAL};

#[derive(Debug, Clone)]
pub struct AntidoteConfig {
    /// Prefix of every backend key
    pub namespace: String,
    /// Rule cache refresh interval
    pub refresh_interval: Duration,
    /// Refresh once immediately when the cache starts
    pub refresh_on_start: bool,
    /// Interval between metrics flushes
    pub metrics_flush_interval: Duration,
}

impl Default for AntidoteConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            refresh_interval: Duration::from_secs_f64(DEFAULT_REFRESH_RATE),
            refresh_on_start: true,
            metrics_flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

impl AntidoteConfig {
    /// Defaults overridden by `ANTIDOTE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(namespace) = lookup("ANTIDOTE_NAMESPACE") {
            if namespace.trim().is_empty() {
                return Err(AntidoteError::Validation("blank namespace".to_string()));
            }
            config.namespace = namespace.trim().to_string();
        }
        if let Some(rate) = lookup("ANTIDOTE_REFRESH_RATE") {
            config = config.with_refresh_rate(parse_secs("ANTIDOTE_REFRESH_RATE", &rate)?)?;
        }
        if let Some(interval) = lookup("ANTIDOTE_METRICS_FLUSH_INTERVAL") {
            let secs = parse_secs("ANTIDOTE_METRICS_FLUSH_INTERVAL", &interval)?;
            config.metrics_flush_interval = validate_refresh_rate(secs)?;
        }

        Ok(config)
    }

    /// Sets the cache refresh rate in seconds. Must be positive and finite.
    pub fn with_refresh_rate(mut self, rate: f64) -> Result<Self> {
        self.refresh_interval = validate_refresh_rate(rate)?;
        Ok(self)
    }

    pub fn keyspace(&self) -> Keyspace {
        Keyspace::new(self.namespace.clone())
    }

    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            refresh_interval: self.refresh_interval,
            run_now: self.refresh_on_start,
        }
    }

    pub fn telemetry(&self) -> TelemetryConfig {
        TelemetryConfig::default()
    }

    /// Rejects zero intervals set directly on the public fields.
    pub fn validate(&self) -> Result<()> {
        validate_interval(self.refresh_interval)?;
        validate_interval(self.metrics_flush_interval)?;
        Ok(())
    }
}

fn parse_secs(name: &str, raw: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| AntidoteError::Validation(format!("{} must be a number; got {:?}", name, raw)))
}
