//! In-process key-value backend.
//!
//! Mirrors the subset of Redis semantics the crate relies on: typed keys,
//! empty collections vanish, expired keys are dropped on next access.

use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::time::{Duration, Instant};

use super::KeyValueStore;
use crate::error::StoreError;

#[derive(Debug)]
enum Value {
    Hash(BTreeMap<String, String>),
    List(VecDeque<String>),
    Set(BTreeSet<String>),
}

impl Value {
    fn is_empty(&self) -> bool {
        match self {
            Value::Hash(h) => h.is_empty(),
            Value::List(l) => l.is_empty(),
            Value::Set(s) => s.is_empty(),
        }
    }
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Instant::now())
    }
}

/// Thread-safe in-memory backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.entries.lock().values().filter(|e| !e.is_expired()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn purge_expired(entries: &mut HashMap<String, Entry>, key: &str) {
    if entries.get(key).is_some_and(Entry::is_expired) {
        entries.remove(key);
    }
}

fn live<'a>(entries: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a Value> {
    purge_expired(entries, key);
    entries.get(key).map(|e| &e.value)
}

fn live_or_insert<'a>(
    entries: &'a mut HashMap<String, Entry>,
    key: &str,
    empty: fn() -> Value,
) -> &'a mut Entry {
    purge_expired(entries, key);
    entries
        .entry(key.to_string())
        .or_insert_with(|| Entry::new(empty()))
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::WrongType(key.to_string())
}

fn remove_if_empty(entries: &mut HashMap<String, Entry>, key: &str) {
    if entries.get(key).is_some_and(|e| e.value.is_empty()) {
        entries.remove(key);
    }
}

impl KeyValueStore for MemoryStore {
    fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>, StoreError> {
        let mut entries = self.entries.lock();
        match live(&mut entries, key) {
            None => Ok(Vec::new()),
            Some(Value::Hash(h)) => Ok(h.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.entries.lock();
        match live(&mut entries, key) {
            None => Ok(None),
            Some(Value::Hash(h)) => Ok(h.get(field).cloned()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn hsetnx(&self, key: &str, field: &str, value: &str) -> Result<bool, StoreError> {
        let mut entries = self.entries.lock();
        let entry = live_or_insert(&mut entries, key, || Value::Hash(BTreeMap::new()));
        let Value::Hash(hash) = &mut entry.value else {
            return Err(wrong_type(key));
        };

        if hash.contains_key(field) {
            return Ok(false);
        }
        hash.insert(field.to_string(), value.to_string());
        Ok(true)
    }

    fn hdel(&self, key: &str, fields: &[String]) -> Result<usize, StoreError> {
        let mut entries = self.entries.lock();
        purge_expired(&mut entries, key);

        let removed = match entries.get_mut(key).map(|e| &mut e.value) {
            None => 0,
            Some(Value::Hash(hash)) => fields.iter().filter(|f| hash.remove(*f).is_some()).count(),
            Some(_) => return Err(wrong_type(key)),
        };

        remove_if_empty(&mut entries, key);
        Ok(removed)
    }

    fn hincrby_batch(
        &self,
        key: &str,
        increments: &[(String, i64)],
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let mut entries = self.entries.lock();
        let entry = live_or_insert(&mut entries, key, || Value::Hash(BTreeMap::new()));
        let Value::Hash(hash) = &mut entry.value else {
            return Err(wrong_type(key));
        };

        for (field, by) in increments {
            let current = match hash.get(field) {
                Some(raw) => raw.parse::<i64>().map_err(|_| {
                    StoreError::Command(format!("hash value is not an integer: {}", field))
                })?,
                None => 0,
            };
            hash.insert(field.clone(), (current + by).to_string());
        }
        entry.expires_at = Some(Instant::now() + ttl);

        remove_if_empty(&mut entries, key);
        Ok(())
    }

    fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let mut entries = self.entries.lock();
        purge_expired(&mut entries, key);
        Ok(entries
            .get(key)
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(Instant::now())))
    }

    fn lpush(&self, key: &str, value: &str) -> Result<usize, StoreError> {
        let mut entries = self.entries.lock();
        let entry = live_or_insert(&mut entries, key, || Value::List(VecDeque::new()));
        let Value::List(list) = &mut entry.value else {
            return Err(wrong_type(key));
        };

        list.push_front(value.to_string());
        Ok(list.len())
    }

    fn llen(&self, key: &str) -> Result<usize, StoreError> {
        let mut entries = self.entries.lock();
        match live(&mut entries, key) {
            None => Ok(0),
            Some(Value::List(list)) => Ok(list.len()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn lrange(&self, key: &str, start: usize, stop: usize) -> Result<Vec<String>, StoreError> {
        let mut entries = self.entries.lock();
        match live(&mut entries, key) {
            None => Ok(Vec::new()),
            Some(Value::List(list)) => {
                if start > stop {
                    return Ok(Vec::new());
                }
                Ok(list.iter().skip(start).take(stop - start + 1).cloned().collect())
            }
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn sadd(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut entries = self.entries.lock();
        let entry = live_or_insert(&mut entries, key, || Value::Set(BTreeSet::new()));
        let Value::Set(set) = &mut entry.value else {
            return Err(wrong_type(key));
        };

        Ok(set.insert(member.to_string()))
    }

    fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut entries = self.entries.lock();
        match live(&mut entries, key) {
            None => Ok(Vec::new()),
            Some(Value::Set(set)) => Ok(set.iter().cloned().collect()),
            Some(_) => Err(wrong_type(key)),
        }
    }
}
