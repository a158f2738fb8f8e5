//! Shared key-value backend.
//!
//! Rules, suspension queues and metrics buckets all live in one key-value
//! store shared by every process. The [`KeyValueStore`] trait exposes only the
//! primitives the layout needs; each call is atomic at the backend.
//!
//! Implementations:
//! - [`MemoryStore`]: process-local maps with lazy expiry
//! - `RedisStore` (feature `redis`): synchronous Redis client

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_store;
pub mod types;

use std::time::Duration;

use crate::error::StoreError;

pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;
pub use types::{Keyspace, DEFAULT_NAMESPACE};

/// Backend primitives. Calls block; async callers should go through
/// `spawn_blocking`.
pub trait KeyValueStore: Send + Sync {
    /// All field/value pairs of a hash. Missing key yields an empty list.
    fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>, StoreError>;

    fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError>;

    /// Sets `field` only if absent. Returns true if the field was written.
    fn hsetnx(&self, key: &str, field: &str, value: &str) -> Result<bool, StoreError>;

    /// Removes fields, returning how many existed.
    fn hdel(&self, key: &str, fields: &[String]) -> Result<usize, StoreError>;

    /// Increments integer hash fields and (re)sets the key's expiry.
    fn hincrby_batch(
        &self,
        key: &str,
        increments: &[(String, i64)],
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// Remaining time to live, `None` for missing or persistent keys.
    fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError>;

    /// Inserts at the head of a list, returning the new length.
    fn lpush(&self, key: &str, value: &str) -> Result<usize, StoreError>;

    fn llen(&self, key: &str) -> Result<usize, StoreError>;

    /// Inclusive range read from the head. Out-of-range yields an empty list.
    fn lrange(&self, key: &str, start: usize, stop: usize) -> Result<Vec<String>, StoreError>;

    /// Adds a set member. Returns true if it was not already present.
    fn sadd(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError>;
}
