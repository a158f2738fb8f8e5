//! On-demand rule refresh.
//!
//! Reloads the full rule list from the store and swaps it in as the current
//! snapshot. A failed load leaves the previous snapshot untouched.
//!
//! Every load takes a generation ticket before reading the store. A load only
//! swaps its result in if no later load (or invalidation) has been applied,
//! so a slow fetch can never overwrite a newer snapshot.

use log::debug;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::Result;
use crate::rule::Rule;
use crate::rule_store::RuleStore;
use crate::types::now_ms;

/// Immutable point-in-time rule list.
pub type Snapshot = Arc<[Rule]>;

/// Statistics from a refresh operation.
#[derive(Debug, Clone)]
pub struct RefreshStats {
    /// Number of rules loaded
    pub rules_refreshed: usize,
    /// Duration of refresh operation in milliseconds
    pub duration_ms: u64,
    /// Timestamp of refresh
    pub timestamp: u64,
    /// False when a newer load or an invalidation superseded this one
    pub applied: bool,
}

struct State {
    snapshot: Snapshot,
    generation: u64,
    refreshed_at: Option<u64>,
}

/// Holds the current snapshot and knows how to rebuild it.
pub struct RefreshService {
    store: RuleStore,
    issued: AtomicU64,
    state: RwLock<State>,
}

impl RefreshService {
    /// Create a service with an empty snapshot.
    pub fn new(store: RuleStore) -> Self {
        Self {
            store,
            issued: AtomicU64::new(0),
            state: RwLock::new(State {
                snapshot: Arc::from(Vec::new()),
                generation: 0,
                refreshed_at: None,
            }),
        }
    }

    /// Current snapshot. The read lock is held only long enough to clone the
    /// pointer.
    pub fn current(&self) -> Snapshot {
        self.state.read().snapshot.clone()
    }

    /// Milliseconds since UNIX epoch of the last applied refresh.
    pub fn last_refresh(&self) -> Option<u64> {
        self.state.read().refreshed_at
    }

    /// Loads every rule from the store and replaces the snapshot.
    ///
    /// Blocks on the backend. The snapshot is not modified on failure, nor
    /// when a newer load was applied while this one was reading.
    pub fn refresh_from_storage(&self) -> Result<RefreshStats> {
        let start = now_ms();
        let ticket = self.begin();

        let rules = self.store.list()?;
        let num_rules = rules.len();

        let timestamp = now_ms();
        let applied = self.apply(ticket, Arc::from(rules), timestamp);
        if applied {
            debug!("rule snapshot refreshed: {} rules", num_rules);
        } else {
            debug!("discarded stale rule load (generation {})", ticket);
        }

        Ok(RefreshStats {
            rules_refreshed: num_rules,
            duration_ms: timestamp.saturating_sub(start),
            timestamp,
            applied,
        })
    }

    /// Discards every load that started before this call.
    pub fn invalidate(&self) {
        let issued = self.issued.load(Ordering::SeqCst);
        let mut state = self.state.write();
        state.generation = state.generation.max(issued);
    }

    fn begin(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn apply(&self, ticket: u64, snapshot: Snapshot, timestamp: u64) -> bool {
        let mut state = self.state.write();
        if ticket <= state.generation {
            return false;
        }
        state.generation = ticket;
        state.snapshot = snapshot;
        state.refreshed_at = Some(timestamp);
        true
    }
}
