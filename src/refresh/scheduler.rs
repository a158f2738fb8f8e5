//! Scheduled rule refresh - background task for periodic snapshot reloading.
//!
//! The scheduler owns at most one tokio task. Each tick runs a refresh cycle
//! on the blocking pool so backend I/O never stalls the runtime's workers.
//! Failures are logged and the task stays scheduled; readers keep whatever
//! snapshot was last loaded.

use log::{debug, error, info};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::service::RefreshService;
use crate::error::{AntidoteError, Result};

/// Default refresh interval in seconds.
pub const DEFAULT_REFRESH_RATE: f64 = 5.0;

/// Configuration for the scheduled refresh task.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval between refresh operations
    pub refresh_interval: Duration,
    /// Run one refresh immediately on start instead of after the first interval
    pub run_now: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs_f64(DEFAULT_REFRESH_RATE),
            run_now: true,
        }
    }
}

impl SchedulerConfig {
    /// Builds a config from a refresh rate in (fractional) seconds.
    pub fn from_secs_f64(rate: f64) -> Result<Self> {
        Ok(Self {
            refresh_interval: validate_refresh_rate(rate)?,
            ..Self::default()
        })
    }
}

/// Accepts only positive, finite rates that survive conversion to a
/// non-zero `Duration`.
pub fn validate_refresh_rate(rate: f64) -> Result<Duration> {
    let invalid = || {
        AntidoteError::Validation(format!("expected positive refresh rate; got {}", rate))
    };
    if !rate.is_finite() || rate <= 0.0 {
        return Err(invalid());
    }
    let interval = Duration::try_from_secs_f64(rate).map_err(|_| invalid())?;
    validate_interval(interval).map_err(|_| invalid())
}

/// Rejects a zero interval; tokio timers cannot tick at period zero.
pub fn validate_interval(interval: Duration) -> Result<Duration> {
    if interval.is_zero() {
        return Err(AntidoteError::Validation(format!(
            "expected positive refresh rate; got {}",
            interval.as_secs_f64()
        )));
    }
    Ok(interval)
}

/// Start/stop handle around the periodic refresh task.
pub struct RefreshScheduler {
    service: Arc<RefreshService>,
    config: SchedulerConfig,
    runtime: Option<Handle>,
    task: Mutex<Option<JoinHandle<()>>>,
    runtime_missing: AtomicBool,
}

impl RefreshScheduler {
    /// Creates a stopped scheduler. Fails on a zero refresh interval.
    ///
    /// `runtime` is where the task will be spawned; when `None` the runtime
    /// current at `start()` is used.
    pub fn new(
        service: Arc<RefreshService>,
        config: SchedulerConfig,
        runtime: Option<Handle>,
    ) -> Result<Self> {
        validate_interval(config.refresh_interval)?;
        Ok(Self {
            service,
            config,
            runtime,
            task: Mutex::new(None),
            runtime_missing: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Starts the background task. Idempotent.
    ///
    /// Returns whether the task is running afterwards; false only when no
    /// tokio runtime is available. A missing runtime is logged once until a
    /// later start succeeds.
    pub fn start(&self) -> bool {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return true;
        }

        let Some(runtime) = self.runtime.clone().or_else(|| Handle::try_current().ok()) else {
            if self.note_missing_runtime() {
                error!("cannot start rule refresher: no tokio runtime available");
            }
            return false;
        };
        self.runtime_missing.store(false, Ordering::Relaxed);

        info!(
            "starting rule refresher with {:.3}-second interval",
            self.config.refresh_interval.as_secs_f64()
        );

        *task = Some(runtime.spawn(run(self.service.clone(), self.config.clone())));
        true
    }

    /// Stops the background task. Idempotent, never fails.
    ///
    /// A load already running on the blocking pool cannot be cancelled; its
    /// result is discarded instead.
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
            self.service.invalidate();
            info!("rule refresher stopped");
        }
    }

    /// Records a start attempt without a runtime. True on the first one.
    fn note_missing_runtime(&self) -> bool {
        !self.runtime_missing.swap(true, Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

async fn run(service: Arc<RefreshService>, config: SchedulerConfig) {
    let first = if config.run_now {
        Instant::now()
    } else {
        Instant::now() + config.refresh_interval
    };

    let mut ticker = interval_at(first, config.refresh_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        do_refresh(&service).await;
    }
}

/// Executes one refresh cycle. Errors are logged, never propagated.
async fn do_refresh(service: &Arc<RefreshService>) {
    let service = service.clone();
    match tokio::task::spawn_blocking(move || service.refresh_from_storage()).await {
        Ok(Ok(stats)) if stats.applied => {
            debug!(
                "scheduled refresh completed: {} rules in {}ms",
                stats.rules_refreshed, stats.duration_ms
            );
        }
        Ok(Ok(_)) => {
            debug!("scheduled refresh superseded by a newer load");
        }
        Ok(Err(e)) => {
            error!("scheduled refresh failed, keeping previous rules: {}", e);
        }
        Err(e) => {
            error!("scheduled refresh task aborted: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule_store::RuleStore;
    use crate::storage::{Keyspace, MemoryStore};

    fn service() -> Arc<RefreshService> {
        let store = RuleStore::new(Arc::new(MemoryStore::new()), Keyspace::default());
        Arc::new(RefreshService::new(store))
    }

    #[test]
    fn test_scheduler_config_defaults() {
        let config = SchedulerConfig::default();
        assert!(config.run_now);
        assert_eq!(config.refresh_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_refresh_rate_validation() {
        let config = SchedulerConfig::from_secs_f64(0.25).unwrap();
        assert_eq!(config.refresh_interval, Duration::from_millis(250));

        for bad in [0.0, -1.0, 1e-12, 1e30, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                SchedulerConfig::from_secs_f64(bad),
                Err(AntidoteError::Validation(_))
            ));
        }
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = SchedulerConfig {
            refresh_interval: Duration::ZERO,
            run_now: true,
        };
        let err = RefreshScheduler::new(service(), config, None).err().unwrap();
        assert_eq!(err.to_string(), "expected positive refresh rate; got 0");
    }

    #[test]
    fn test_start_without_runtime() {
        let scheduler = RefreshScheduler::new(service(), SchedulerConfig::default(), None).unwrap();
        assert!(!scheduler.start());
        assert!(!scheduler.is_running());
        scheduler.stop();
    }

    #[test]
    fn test_missing_runtime_reported_once() {
        let scheduler = RefreshScheduler::new(service(), SchedulerConfig::default(), None).unwrap();
        for _ in 0..5 {
            assert!(!scheduler.start());
        }
        // the first failed start already consumed the report
        assert!(!scheduler.note_missing_runtime());

        let runtime = tokio::runtime::Runtime::new().unwrap();
        {
            let _guard = runtime.enter();
            assert!(scheduler.start());
            scheduler.stop();
        }
        // a successful start re-arms the report
        assert!(!scheduler.runtime_missing.load(Ordering::Relaxed));

        assert!(!scheduler.start());
        assert!(scheduler.runtime_missing.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn test_start_stop_idempotent() {
        let scheduler = RefreshScheduler::new(service(), SchedulerConfig::default(), None).unwrap();
        assert!(!scheduler.is_running());

        assert!(scheduler.start());
        assert!(scheduler.start());
        assert!(scheduler.is_running());

        scheduler.stop();
        scheduler.stop();
        assert!(!scheduler.is_running());

        assert!(scheduler.start());
        assert!(scheduler.is_running());
    }

    #[tokio::test]
    async fn test_run_now_refreshes_immediately() {
        let service = service();
        let config = SchedulerConfig {
            refresh_interval: Duration::from_secs(3600),
            run_now: true,
        };
        let scheduler = RefreshScheduler::new(service.clone(), config, None).unwrap();
        scheduler.start();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(service.last_refresh().is_some());
    }

    #[tokio::test]
    async fn test_delayed_start_waits_for_interval() {
        let service = service();
        let config = SchedulerConfig {
            refresh_interval: Duration::from_secs(3600),
            run_now: false,
        };
        let scheduler = RefreshScheduler::new(service.clone(), config, None).unwrap();
        scheduler.start();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(service.last_refresh().is_none());
    }
}
