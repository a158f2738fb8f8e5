//! Persistent rule repository.
//!
//! All rules live in a single hash keyed by rule id, each value a compact JSON
//! pair `["<treatment>","<pattern>"]`. Reads prune entries that no longer
//! parse; writes rely only on the backend's atomic `HSETNX`/`HDEL`.

use log::{error, info};
use rand::rngs::OsRng;
use rand::RngCore;
use std::sync::Arc;

use crate::error::{AntidoteError, Result, StoreError};
use crate::pattern::Pattern;
use crate::rule::Rule;
use crate::storage::{KeyValueStore, Keyspace};
use crate::types::Treatment;

/// Attempts `add` makes before giving up on finding a free id.
pub const MAX_ID_ATTEMPTS: usize = 3;

/// Source of fresh rule ids.
pub trait IdSource: Send + Sync {
    fn next_id(&self) -> String;
}

/// 16 hex characters from 8 bytes of OS randomness.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIds;

impl IdSource for RandomIds {
    fn next_id(&self) -> String {
        let mut bytes = [0u8; 8];
        OsRng.fill_bytes(&mut bytes);
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

/// CRUD over the shared rule hash.
#[derive(Clone)]
pub struct RuleStore {
    backend: Arc<dyn KeyValueStore>,
    keys: Keyspace,
    ids: Arc<dyn IdSource>,
}

impl RuleStore {
    pub fn new(backend: Arc<dyn KeyValueStore>, keys: Keyspace) -> Self {
        Self::with_id_source(backend, keys, Arc::new(RandomIds))
    }

    pub fn with_id_source(
        backend: Arc<dyn KeyValueStore>,
        keys: Keyspace,
        ids: Arc<dyn IdSource>,
    ) -> Self {
        Self { backend, keys, ids }
    }

    pub fn keys(&self) -> &Keyspace {
        &self.keys
    }

    pub fn backend(&self) -> &Arc<dyn KeyValueStore> {
        &self.backend
    }

    /// Reads every rule.
    ///
    /// Entries that fail to deserialize are logged and deleted; they are never
    /// reported to the caller. Backend failures are.
    pub fn list(&self) -> Result<Vec<Rule>> {
        let entries = self.backend.hgetall(self.keys.rules())?;
        let mut rules = Vec::with_capacity(entries.len());
        let mut broken_ids = Vec::new();

        for (id, payload) in entries {
            match deserialize(&id, &payload) {
                Ok(rule) => rules.push(rule),
                Err(e) => {
                    error!("failed deserializing rule {} ({:?}): {}", id, payload, e);
                    broken_ids.push(id);
                }
            }
        }

        if !broken_ids.is_empty() {
            self.delete(&broken_ids)?;
        }

        Ok(rules)
    }

    /// Stores a new rule under a fresh random id.
    ///
    /// The pattern is compiled before the backend is touched. Each attempt
    /// draws a new id and inserts only if absent; after
    /// [`MAX_ID_ATTEMPTS`] collisions the call fails with `StoreExhausted`.
    pub fn add(&self, treatment: Treatment, pattern: &str) -> Result<Rule> {
        let pattern = Pattern::compile(pattern)?;

        for _ in 0..MAX_ID_ATTEMPTS {
            let rule = Rule::new(self.ids.next_id(), treatment, pattern.clone())?;
            let payload = serialize(&rule)?;

            if self.backend.hsetnx(self.keys.rules(), rule.id(), &payload)? {
                info!("added rule {}: {}", rule.id(), rule);
                return Ok(rule);
            }
        }

        Err(AntidoteError::StoreExhausted {
            attempts: MAX_ID_ATTEMPTS,
        })
    }

    /// Removes rules by id. Absent ids and an empty list are no-ops.
    pub fn delete<S: AsRef<str>>(&self, ids: &[S]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let fields: Vec<String> = ids.iter().map(|id| id.as_ref().to_string()).collect();
        self.backend.hdel(self.keys.rules(), &fields)?;
        Ok(())
    }
}

fn serialize(rule: &Rule) -> Result<String> {
    let pair = (rule.treatment(), rule.pattern().source());
    let payload = serde_json::to_string(&pair).map_err(StoreError::from)?;
    Ok(payload)
}

fn deserialize(id: &str, payload: &str) -> Result<Rule> {
    let (treatment, pattern): (String, String) =
        serde_json::from_str(payload).map_err(StoreError::from)?;
    Rule::parse(id, &treatment, &pattern)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use parking_lot::Mutex;

    struct ScriptedIds {
        ids: Mutex<Vec<String>>,
        calls: Mutex<usize>,
    }

    impl ScriptedIds {
        fn new(ids: &[&str]) -> Self {
            Self {
                ids: Mutex::new(ids.iter().rev().map(|s| s.to_string()).collect()),
                calls: Mutex::new(0),
            }
        }
    }

    impl IdSource for ScriptedIds {
        fn next_id(&self) -> String {
            *self.calls.lock() += 1;
            let mut ids = self.ids.lock();
            if ids.len() > 1 {
                ids.pop().unwrap()
            } else {
                ids[0].clone()
            }
        }
    }

    fn setup(ids: Option<Arc<ScriptedIds>>) -> (Arc<MemoryStore>, RuleStore) {
        let backend = Arc::new(MemoryStore::new());
        let store = match ids {
            Some(ids) => RuleStore::with_id_source(backend.clone(), Keyspace::default(), ids),
            None => RuleStore::new(backend.clone(), Keyspace::default()),
        };
        (backend, store)
    }

    #[test]
    fn test_random_ids_are_hex() {
        let id = RandomIds.next_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, RandomIds.next_id());
    }

    #[test]
    fn test_add_then_list() {
        let (backend, store) = setup(None);
        let rule = store.add(Treatment::Skip, "A::*::C").unwrap();

        assert_eq!(store.list().unwrap(), vec![rule.clone()]);
        assert_eq!(
            backend.hget("sidekiq-antidote", rule.id()).unwrap().as_deref(),
            Some(r#"["skip","A::*::C"]"#)
        );
    }

    #[test]
    fn test_add_rejects_bad_pattern_before_writing() {
        let (backend, store) = setup(None);
        let err = store.add(Treatment::Kill, "A::***").unwrap_err();
        assert!(matches!(err, AntidoteError::Pattern(_)));
        assert!(backend.is_empty());
    }

    #[test]
    fn test_add_retries_on_collision() {
        let ids = Arc::new(ScriptedIds::new(&["taken", "taken", "free"]));
        let (backend, store) = setup(Some(ids.clone()));
        backend.hsetnx("sidekiq-antidote", "taken", r#"["skip","X"]"#).unwrap();

        let rule = store.add(Treatment::Suspend, "Y").unwrap();
        assert_eq!(rule.id(), "free");
        assert_eq!(*ids.calls.lock(), 3);
    }

    #[test]
    fn test_add_exhausts_after_three_attempts() {
        let ids = Arc::new(ScriptedIds::new(&["taken"]));
        let (backend, store) = setup(Some(ids.clone()));
        backend.hsetnx("sidekiq-antidote", "taken", r#"["skip","X"]"#).unwrap();

        let err = store.add(Treatment::Skip, "Y").unwrap_err();
        assert!(matches!(err, AntidoteError::StoreExhausted { attempts: 3 }));
        assert_eq!(*ids.calls.lock(), 3);
    }

    #[test]
    fn test_list_prunes_corrupt_entries() {
        let (backend, store) = setup(None);
        let good = store.add(Treatment::Kill, "Good").unwrap();
        backend.hsetnx("sidekiq-antidote", "bad-json", "not json").unwrap();
        backend.hsetnx("sidekiq-antidote", "bad-treatment", r#"["nuke","X"]"#).unwrap();
        backend.hsetnx("sidekiq-antidote", "bad-pattern", r#"["skip","***"]"#).unwrap();

        assert_eq!(store.list().unwrap(), vec![good.clone()]);
        assert_eq!(backend.hgetall("sidekiq-antidote").unwrap().len(), 1);
    }

    #[test]
    fn test_delete() {
        let (_, store) = setup(None);
        let a = store.add(Treatment::Skip, "A").unwrap();
        let b = store.add(Treatment::Skip, "B").unwrap();

        store.delete(&[a.id()]).unwrap();
        assert_eq!(store.list().unwrap(), vec![b.clone()]);

        store.delete(&["missing"]).unwrap();
        store.delete::<&str>(&[]).unwrap();
        assert_eq!(store.list().unwrap(), vec![b]);
    }
}
