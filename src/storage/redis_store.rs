//! Redis-backed key-value store (feature `redis`).
//!
//! Uses the synchronous client and opens a connection per call, so the store
//! is cheap to share and survives server restarts without reconnect logic.

use std::time::Duration;

use super::KeyValueStore;
use crate::error::StoreError;

#[derive(Debug, Clone)]
pub struct RedisStore {
    client: redis::Client,
}

impl RedisStore {
    /// Create a store for the given URL (e.g. `redis://localhost:6379`).
    ///
    /// No connection is made until the first command.
    pub fn open(redis_url: impl AsRef<str>) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self { client })
    }

    fn connection(&self) -> Result<redis::Connection, StoreError> {
        self.client
            .get_connection()
            .map_err(|e| StoreError::Connection(e.to_string()))
    }
}

impl KeyValueStore for RedisStore {
    fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>, StoreError> {
        let mut conn = self.connection()?;
        Ok(redis::cmd("HGETALL").arg(key).query(&mut conn)?)
    }

    fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection()?;
        Ok(redis::cmd("HGET").arg(key).arg(field).query(&mut conn)?)
    }

    fn hsetnx(&self, key: &str, field: &str, value: &str) -> Result<bool, StoreError> {
        let mut conn = self.connection()?;
        Ok(redis::cmd("HSETNX")
            .arg(key)
            .arg(field)
            .arg(value)
            .query(&mut conn)?)
    }

    fn hdel(&self, key: &str, fields: &[String]) -> Result<usize, StoreError> {
        if fields.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connection()?;
        Ok(redis::cmd("HDEL").arg(key).arg(fields).query(&mut conn)?)
    }

    fn hincrby_batch(
        &self,
        key: &str,
        increments: &[(String, i64)],
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let mut conn = self.connection()?;
        let mut pipe = redis::pipe();
        for (field, by) in increments {
            pipe.cmd("HINCRBY").arg(key).arg(field).arg(*by).ignore();
        }
        pipe.cmd("EXPIRE").arg(key).arg(ttl.as_secs()).ignore();
        pipe.query::<()>(&mut conn)?;
        Ok(())
    }

    fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let mut conn = self.connection()?;
        // -2: missing key, -1: no expiry
        let secs: i64 = redis::cmd("TTL").arg(key).query(&mut conn)?;
        Ok((secs >= 0).then(|| Duration::from_secs(secs as u64)))
    }

    fn lpush(&self, key: &str, value: &str) -> Result<usize, StoreError> {
        let mut conn = self.connection()?;
        Ok(redis::cmd("LPUSH").arg(key).arg(value).query(&mut conn)?)
    }

    fn llen(&self, key: &str) -> Result<usize, StoreError> {
        let mut conn = self.connection()?;
        Ok(redis::cmd("LLEN").arg(key).query(&mut conn)?)
    }

    fn lrange(&self, key: &str, start: usize, stop: usize) -> Result<Vec<String>, StoreError> {
        let mut conn = self.connection()?;
        Ok(redis::cmd("LRANGE")
            .arg(key)
            .arg(start)
            .arg(stop)
            .query(&mut conn)?)
    }

    fn sadd(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut conn = self.connection()?;
        Ok(redis::cmd("SADD").arg(key).arg(member).query(&mut conn)?)
    }

    fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.connection()?;
        let mut members: Vec<String> = redis::cmd("SMEMBERS").arg(key).query(&mut conn)?;
        members.sort();
        Ok(members)
    }
}
