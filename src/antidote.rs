//! Process-level context wiring the store, cache, metrics and suspension
//! queues together.
//!
//! Build one [`Antidote`] at startup and hand it to the job pipeline. The
//! pipeline calls [`Antidote::inhibit`] for each job and, on a hit, drops or
//! kills the job itself; suspended jobs are already queued by then.

use log::{info, warn};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::config::AntidoteConfig;
use crate::error::Result;
use crate::job::JobRecord;
use crate::refresh::RuleCache;
use crate::rule::Rule;
use crate::rule_store::RuleStore;
use crate::storage::KeyValueStore;
use crate::suspension::SuspensionQueue;
use crate::telemetry::MetricsAggregator;
use crate::types::Treatment;

pub struct Antidote {
    config: RwLock<AntidoteConfig>,
    store: RuleStore,
    cache: RwLock<Arc<RuleCache>>,
    metrics: Arc<MetricsAggregator>,
    /// Running flusher task. Its lock also serializes startup, shutdown and
    /// reconfigure.
    flusher: Mutex<Option<JoinHandle<()>>>,
}

impl Antidote {
    /// Builds a stopped context over `backend`. Fails on zero intervals.
    pub fn new(config: AntidoteConfig, backend: Arc<dyn KeyValueStore>) -> Result<Self> {
        let store = RuleStore::new(backend, config.keyspace());
        Self::with_store(config, store)
    }

    /// Builds a stopped context over an existing store.
    pub fn with_store(config: AntidoteConfig, store: RuleStore) -> Result<Self> {
        config.validate()?;
        let cache = RuleCache::new(store.clone(), config.scheduler())?;
        let metrics = MetricsAggregator::new(store.backend().clone(), config.telemetry());
        Ok(Self {
            config: RwLock::new(config),
            store,
            cache: RwLock::new(Arc::new(cache)),
            metrics: Arc::new(metrics),
            flusher: Mutex::new(None),
        })
    }

    /// Snapshot of the active configuration.
    pub fn config(&self) -> AntidoteConfig {
        self.config.read().clone()
    }

    pub fn store(&self) -> &RuleStore {
        &self.store
    }

    pub fn cache(&self) -> Arc<RuleCache> {
        self.cache.read().clone()
    }

    pub fn metrics(&self) -> &Arc<MetricsAggregator> {
        &self.metrics
    }

    /// Adds a rule to the shared store. Visible to every process after its
    /// next refresh.
    pub fn add(&self, treatment: Treatment, pattern: &str) -> Result<Rule> {
        self.store.add(treatment, pattern)
    }

    /// Deletes rules from the shared store.
    pub fn delete<S: AsRef<str>>(&self, ids: &[S]) -> Result<()> {
        self.store.delete(ids)
    }

    /// Live rule list read straight from the store.
    pub fn inhibitors(&self) -> Result<Vec<Rule>> {
        self.store.list()
    }

    /// First cached rule matching the job's display class.
    pub fn remedy_for(&self, job: &JobRecord) -> Option<Rule> {
        self.cache().find_for(&job.display_class())
    }

    /// Looks up a remedy for `job` and applies the bookkeeping side of it.
    ///
    /// On a hit the poison and remedy are logged, the hit is counted, and for
    /// `suspend` the payload is pushed onto the rule's suspension queue.
    /// Returns the matched rule; `None` means the job should run normally.
    pub fn inhibit(&self, job: &JobRecord) -> Result<Option<Rule>> {
        let display_class = job.display_class();
        let Some(rule) = self.cache().find_for(&display_class) else {
            return Ok(None);
        };

        warn!("I've got a poison! -- {}", display_class);
        warn!("I've got a remedy! -- {}", rule);

        self.metrics.track(rule.treatment(), &display_class);
        if rule.treatment() == Treatment::Suspend {
            self.suspension_queue(rule.id()).add(job.payload())?;
        }

        Ok(Some(rule))
    }

    /// Handle to the suspension queue of rule `id`.
    pub fn suspension_queue(&self, id: &str) -> SuspensionQueue {
        SuspensionQueue::new(self.store.backend().clone(), self.store.keys().clone(), id)
    }

    /// Every registered suspension queue.
    pub fn suspension_queues(&self) -> Result<Vec<SuspensionQueue>> {
        SuspensionQueue::list_all(self.store.backend().clone(), self.store.keys().clone())
    }

    /// Starts the rule refresher and, inside a tokio runtime, the metrics
    /// flusher.
    pub fn startup(&self) -> &Self {
        let mut flusher = self.flusher.lock();
        self.cache().start();

        if flusher.is_none() && tokio::runtime::Handle::try_current().is_ok() {
            let period = self.config.read().metrics_flush_interval;
            match self.metrics.spawn_flusher(period) {
                Ok(task) => *flusher = Some(task),
                Err(e) => warn!("metrics flusher not started: {}", e),
            }
        }
        self
    }

    /// Stops background work and flushes pending metrics.
    pub fn shutdown(&self) -> &Self {
        let mut flusher = self.flusher.lock();
        self.cache().stop();
        if let Some(task) = flusher.take() {
            task.abort();
        }
        if let Err(e) = self.metrics.flush_now() {
            warn!("final metrics flush failed: {}", e);
        }
        self
    }

    /// Applies a new configuration. The namespace is fixed at construction.
    ///
    /// The current cache is stopped and replaced by a stopped one using the
    /// new refresh settings; the next read (or `startup`) starts it. A running
    /// metrics flusher is restarted with the new flush interval, which needs
    /// a tokio runtime. On error nothing changes.
    pub fn reconfigure(&self, config: AntidoteConfig) -> Result<()> {
        let mut flusher = self.flusher.lock();

        let config = AntidoteConfig {
            namespace: self.config.read().namespace.clone(),
            ..config
        };
        config.validate()?;
        let fresh = Arc::new(RuleCache::new(self.store.clone(), config.scheduler())?);
        let restarted = match flusher.as_ref() {
            Some(_) => Some(self.metrics.spawn_flusher(config.metrics_flush_interval)?),
            None => None,
        };

        if let Some(task) = restarted {
            if let Some(old) = flusher.replace(task) {
                old.abort();
            }
        }
        let old = std::mem::replace(&mut *self.cache.write(), fresh);
        old.stop();

        info!(
            "reconfigured rule cache with {:.3}-second refresh interval",
            config.refresh_interval.as_secs_f64()
        );
        *self.config.write() = config;
        Ok(())
    }
}

impl Drop for Antidote {
    fn drop(&mut self) {
        self.cache.get_mut().stop();
        if let Some(flusher) = self.flusher.get_mut().take() {
            flusher.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;
    use std::time::Duration;

    fn antidote() -> (Arc<MemoryStore>, Antidote) {
        let backend = Arc::new(MemoryStore::new());
        let antidote = Antidote::new(AntidoteConfig::default(), backend.clone()).unwrap();
        (backend, antidote)
    }

    #[test]
    fn test_inhibit_miss() {
        let (_, antidote) = antidote();
        antidote.add(Treatment::Skip, "Other").unwrap();
        antidote.cache().refresh_now().unwrap();

        let job = JobRecord::new(json!({"class": "Billing::ChargeJob"}));
        assert!(antidote.inhibit(&job).unwrap().is_none());
    }

    #[test]
    fn test_inhibit_tracks_hit() {
        let (_, antidote) = antidote();
        let rule = antidote.add(Treatment::Kill, "Billing::*").unwrap();
        antidote.cache().refresh_now().unwrap();

        let job = JobRecord::new(json!({"class": "Billing::ChargeJob"}));
        let hit = antidote.inhibit(&job).unwrap().unwrap();
        assert_eq!(hit, rule);
        assert!(hit.is_lethal());
        assert_eq!(antidote.metrics().pending(Treatment::Kill, "Billing::ChargeJob"), 1);
    }

    #[test]
    fn test_inhibit_suspends_payload() {
        let (_, antidote) = antidote();
        let rule = antidote.add(Treatment::Suspend, "ReportJob").unwrap();
        antidote.cache().refresh_now().unwrap();

        let payload = json!({"class": "ReportJob", "jid": "j1"});
        antidote.inhibit(&JobRecord::new(payload.clone())).unwrap();

        let queues = antidote.suspension_queues().unwrap();
        assert_eq!(queues.len(), 1);
        assert_eq!(queues[0].name(), rule.id());
        let held: Vec<String> = queues[0].iter().collect::<Result<_>>().unwrap();
        assert_eq!(held, vec![payload.to_string()]);
    }

    #[test]
    fn test_delete_and_inhibitors() {
        let (_, antidote) = antidote();
        let a = antidote.add(Treatment::Skip, "A").unwrap();
        antidote.delete(&[a.id()]).unwrap();
        assert!(antidote.inhibitors().unwrap().is_empty());
    }

    #[test]
    fn test_reconfigure_keeps_namespace() {
        let (_, antidote) = antidote();
        let config = AntidoteConfig {
            namespace: "other".to_string(),
            ..AntidoteConfig::default()
        }
        .with_refresh_rate(42.0)
        .unwrap();

        antidote.reconfigure(config).unwrap();
        assert_eq!(antidote.config().namespace, "sidekiq-antidote");
        assert_eq!(antidote.config().refresh_interval, Duration::from_secs(42));
        assert_eq!(
            antidote.cache().config().refresh_interval,
            Duration::from_secs(42)
        );
    }

    #[test]
    fn test_zero_intervals_rejected() {
        let backend = Arc::new(MemoryStore::new());
        let config = AntidoteConfig {
            refresh_interval: Duration::ZERO,
            ..AntidoteConfig::default()
        };
        assert!(Antidote::new(config, backend.clone()).is_err());

        let (_, antidote) = antidote();
        let before = antidote.cache();
        let config = AntidoteConfig {
            metrics_flush_interval: Duration::ZERO,
            ..AntidoteConfig::default()
        };
        assert!(antidote.reconfigure(config).is_err());
        assert!(Arc::ptr_eq(&before, &antidote.cache()));
        assert_eq!(antidote.config().metrics_flush_interval, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_reconfigure_from_shared_handle() {
        let (_, antidote) = antidote();
        let antidote = Arc::new(antidote);
        antidote.startup();
        let before = antidote.cache();
        assert!(before.is_running());

        let shared = antidote.clone();
        let config = AntidoteConfig {
            metrics_flush_interval: Duration::from_secs(30),
            ..AntidoteConfig::default()
        };
        tokio::task::spawn_blocking(move || shared.reconfigure(config))
            .await
            .unwrap()
            .unwrap();

        assert!(!before.is_running());
        assert!(!Arc::ptr_eq(&before, &antidote.cache()));
        assert!(antidote.flusher.lock().is_some());
        assert_eq!(antidote.config().metrics_flush_interval, Duration::from_secs(30));

        // the replacement cache starts on the next read
        antidote.remedy_for(&JobRecord::new(json!({"class": "A"})));
        assert!(antidote.cache().is_running());
        antidote.shutdown();
    }

    #[tokio::test]
    async fn test_startup_shutdown() {
        let (_, antidote) = antidote();
        antidote.startup();
        assert!(antidote.cache().is_running());
        antidote.shutdown();
        assert!(!antidote.cache().is_running());
    }
}
