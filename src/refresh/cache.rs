//! Eventually consistent rule cache.
//!
//! Job dispatch reads rules from here instead of hitting the backend on every
//! lookup. Reads never wait for a fetch: until the first refresh completes
//! they see an empty list, and after a backend outage they keep seeing the
//! last good snapshot.

use std::sync::Arc;
use tokio::runtime::Handle;

use super::scheduler::{RefreshScheduler, SchedulerConfig};
use super::service::{RefreshService, RefreshStats, Snapshot};
use crate::error::Result;
use crate::rule::Rule;
use crate::rule_store::RuleStore;

pub struct RuleCache {
    service: Arc<RefreshService>,
    scheduler: RefreshScheduler,
}

impl RuleCache {
    /// Creates a stopped cache over `store`. Fails on a zero refresh
    /// interval.
    ///
    /// Captures the current tokio runtime (if any) for the refresh task.
    pub fn new(store: RuleStore, config: SchedulerConfig) -> Result<Self> {
        Self::build(store, config, Handle::try_current().ok())
    }

    /// Creates a stopped cache whose refresh task runs on `runtime`.
    pub fn with_runtime(
        store: RuleStore,
        config: SchedulerConfig,
        runtime: Handle,
    ) -> Result<Self> {
        Self::build(store, config, Some(runtime))
    }

    fn build(store: RuleStore, config: SchedulerConfig, runtime: Option<Handle>) -> Result<Self> {
        let service = Arc::new(RefreshService::new(store));
        let scheduler = RefreshScheduler::new(service.clone(), config, runtime)?;
        Ok(Self { service, scheduler })
    }

    pub fn config(&self) -> &SchedulerConfig {
        self.scheduler.config()
    }

    /// Starts the refresher. Idempotent.
    pub fn start(&self) -> bool {
        self.scheduler.start()
    }

    /// Stops the refresher. Idempotent.
    pub fn stop(&self) {
        self.scheduler.stop()
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Starts the refresher if it is not running. Called by every read.
    ///
    /// Without a runtime this only reports false; reads keep serving the
    /// current snapshot.
    pub fn ensure_started(&self) -> bool {
        self.is_running() || self.start()
    }

    /// Current snapshot without touching the refresher.
    pub fn snapshot(&self) -> Snapshot {
        self.service.current()
    }

    /// All cached rules, lazily starting the refresher.
    pub fn enumerate(&self) -> Snapshot {
        self.ensure_started();
        self.service.current()
    }

    /// First cached rule satisfying `predicate`, lazily starting the
    /// refresher.
    pub fn find<P>(&self, mut predicate: P) -> Option<Rule>
    where
        P: FnMut(&Rule) -> bool,
    {
        self.enumerate().iter().find(|rule| predicate(rule)).cloned()
    }

    /// First cached rule whose pattern matches `display_class`.
    pub fn find_for(&self, display_class: &str) -> Option<Rule> {
        self.find(|rule| rule.matches(display_class))
    }

    /// Runs one refresh cycle synchronously on the calling thread.
    pub fn refresh_now(&self) -> Result<RefreshStats> {
        self.service.refresh_from_storage()
    }

    /// Time of the last successful refresh in ms since UNIX epoch.
    pub fn last_refresh(&self) -> Option<u64> {
        self.service.last_refresh()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Keyspace, MemoryStore};
    use crate::types::Treatment;

    fn store() -> RuleStore {
        RuleStore::new(Arc::new(MemoryStore::new()), Keyspace::default())
    }

    #[test]
    fn test_reads_without_runtime_serve_snapshot() {
        let store = store();
        let cache = RuleCache::new(store.clone(), SchedulerConfig::default()).unwrap();
        let rule = store.add(Treatment::Kill, "A::*").unwrap();

        assert!(cache.find_for("A::B").is_none());
        assert!(!cache.is_running());

        cache.refresh_now().unwrap();
        assert_eq!(cache.find_for("A::B"), Some(rule));
        assert!(cache.find_for("B").is_none());
    }

    #[test]
    fn test_find_returns_first_match_in_snapshot_order() {
        let store = store();
        let cache = RuleCache::new(store.clone(), SchedulerConfig::default()).unwrap();
        store.add(Treatment::Skip, "A::**").unwrap();
        store.add(Treatment::Kill, "A::B").unwrap();
        cache.refresh_now().unwrap();

        let first = cache.snapshot().iter().find(|r| r.matches("A::B")).cloned();
        assert_eq!(cache.find_for("A::B"), first);
        assert_eq!(cache.enumerate().len(), 2);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = SchedulerConfig {
            refresh_interval: std::time::Duration::ZERO,
            run_now: true,
        };
        let result = RuleCache::new(store(), config);
        assert!(matches!(result, Err(crate::AntidoteError::Validation(_))));
    }

    #[test]
    fn test_repeated_reads_without_runtime() {
        let store = store();
        let cache = RuleCache::new(store.clone(), SchedulerConfig::default()).unwrap();
        store.add(Treatment::Skip, "A").unwrap();
        cache.refresh_now().unwrap();

        for _ in 0..5 {
            assert!(!cache.ensure_started());
            assert!(cache.find_for("A").is_some());
        }
        assert!(!cache.is_running());
    }

    #[tokio::test]
    async fn test_enumerate_lazily_starts() {
        let cache = RuleCache::new(store(), SchedulerConfig::default()).unwrap();
        assert!(!cache.is_running());
        assert!(cache.enumerate().is_empty());
        assert!(cache.is_running());

        cache.stop();
        assert!(!cache.is_running());
        assert!(cache.ensure_started());
        assert!(cache.is_running());
    }
}
