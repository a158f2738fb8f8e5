//! Shared test backend.

#![allow(dead_code)]

use antidote::{KeyValueStore, MemoryStore, StoreError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Memory backend whose reads and writes can be made to fail independently.
///
/// Reads: `hgetall`. Writes: `hsetnx`, `hdel`, `hincrby_batch`, `lpush`,
/// `sadd`.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    reads_failing: AtomicBool,
    writes_failing: AtomicBool,
}

impl FlakyStore {
    pub fn fail_reads(&self, failing: bool) {
        self.reads_failing.store(failing, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, failing: bool) {
        self.writes_failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self, flag: &AtomicBool) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            return Err(StoreError::Connection("backend unavailable".to_string()));
        }
        Ok(())
    }
}

impl KeyValueStore for FlakyStore {
    fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>, StoreError> {
        self.check(&self.reads_failing)?;
        self.inner.hgetall(key)
    }

    fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        self.inner.hget(key, field)
    }

    fn hsetnx(&self, key: &str, field: &str, value: &str) -> Result<bool, StoreError> {
        self.check(&self.writes_failing)?;
        self.inner.hsetnx(key, field, value)
    }

    fn hdel(&self, key: &str, fields: &[String]) -> Result<usize, StoreError> {
        self.check(&self.writes_failing)?;
        self.inner.hdel(key, fields)
    }

    fn hincrby_batch(
        &self,
        key: &str,
        increments: &[(String, i64)],
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.check(&self.writes_failing)?;
        self.inner.hincrby_batch(key, increments, ttl)
    }

    fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        self.inner.ttl(key)
    }

    fn lpush(&self, key: &str, value: &str) -> Result<usize, StoreError> {
        self.check(&self.writes_failing)?;
        self.inner.lpush(key, value)
    }

    fn llen(&self, key: &str) -> Result<usize, StoreError> {
        self.inner.llen(key)
    }

    fn lrange(&self, key: &str, start: usize, stop: usize) -> Result<Vec<String>, StoreError> {
        self.inner.lrange(key, start, stop)
    }

    fn sadd(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.check(&self.writes_failing)?;
        self.inner.sadd(key, member)
    }

    fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.inner.smembers(key)
    }
}
