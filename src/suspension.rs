//! Suspension queues for the `suspend` treatment.
//!
//! Each group (conventionally a rule id) is a list of serialized job payloads
//! with the newest at the head. Group names are also recorded in a registry
//! set so every group can be listed without scanning the keyspace.
//!
//! Releasing or draining a group is left to the caller.

use serde::Serialize;
use std::sync::{Arc, OnceLock};

use crate::error::{Result, StoreError};
use crate::storage::{KeyValueStore, Keyspace};

/// Entries fetched per range read while iterating.
pub const PAGE_SIZE: usize = 50;

/// Handle to one named suspension group.
pub struct SuspensionQueue {
    backend: Arc<dyn KeyValueStore>,
    keys: Keyspace,
    name: String,
    key: String,
    size: OnceLock<usize>,
}

impl SuspensionQueue {
    pub fn new(backend: Arc<dyn KeyValueStore>, keys: Keyspace, name: impl Into<String>) -> Self {
        let name = name.into();
        let key = keys.suspension(&name);
        Self {
            backend,
            keys,
            name,
            key,
            size: OnceLock::new(),
        }
    }

    /// One handle per registered group name.
    pub fn list_all(backend: Arc<dyn KeyValueStore>, keys: Keyspace) -> Result<Vec<Self>> {
        let names = backend.smembers(&keys.suspension_registry())?;
        Ok(names
            .into_iter()
            .map(|name| Self::new(backend.clone(), keys.clone(), name))
            .collect())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Serializes `payload`, pushes it onto the head of the group and
    /// registers the group name. The two writes are not transactional.
    pub fn add<T: Serialize + ?Sized>(&self, payload: &T) -> Result<()> {
        let raw = serde_json::to_string(payload).map_err(StoreError::from)?;
        self.backend.lpush(&self.key, &raw)?;
        self.backend
            .sadd(&self.keys.suspension_registry(), &self.name)?;
        Ok(())
    }

    /// Number of held jobs.
    ///
    /// The first successful read is cached for the lifetime of this handle;
    /// later additions are not reflected. Create a fresh handle for a current
    /// count.
    pub fn size(&self) -> Result<usize> {
        if let Some(size) = self.size.get() {
            return Ok(*size);
        }
        let size = self.backend.llen(&self.key)?;
        Ok(*self.size.get_or_init(|| size))
    }

    /// Raw payloads, most recently added first, fetched in pages of
    /// [`PAGE_SIZE`] until an empty page.
    pub fn iter(&self) -> SuspensionIter<'_> {
        SuspensionIter {
            queue: self,
            page: 0,
            buffer: Vec::new().into_iter(),
            done: false,
        }
    }
}

impl std::fmt::Debug for SuspensionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuspensionQueue")
            .field("name", &self.name)
            .field("key", &self.key)
            .finish()
    }
}

/// Paging iterator over a suspension group.
///
/// Yields `Err` once and stops if a page read fails.
pub struct SuspensionIter<'a> {
    queue: &'a SuspensionQueue,
    page: usize,
    buffer: std::vec::IntoIter<String>,
    done: bool,
}

impl Iterator for SuspensionIter<'_> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.buffer.next() {
                return Some(Ok(entry));
            }
            if self.done {
                return None;
            }

            let start = self.page * PAGE_SIZE;
            let stop = start + PAGE_SIZE - 1;
            match self.queue.backend.lrange(&self.queue.key, start, stop) {
                Ok(entries) if entries.is_empty() => {
                    self.done = true;
                    return None;
                }
                Ok(entries) => {
                    self.page += 1;
                    self.buffer = entries.into_iter();
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
            }
        }
    }
}
