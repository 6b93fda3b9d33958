//! In-memory record of live uploads and their creation times.
//!
//! The index is the authority for eviction. It is not persisted; anything
//! left on disk by a previous process is handled by startup reconciliation.

use crate::models::object_id::ObjectId;
use chrono::{DateTime, Utc};
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

#[derive(Debug, Default)]
pub struct RetentionIndex {
    // Never held across an `.await`.
    entries: Mutex<HashMap<ObjectId, DateTime<Utc>>>,
}

impl RetentionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<ObjectId, DateTime<Utc>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Track `id` as created at `created_at`. Re-recording overwrites.
    pub fn record(&self, id: ObjectId, created_at: DateTime<Utc>) {
        self.entries().insert(id, created_at);
    }

    /// Ids whose age is strictly greater than `ttl` at `now`.
    ///
    /// Returns a snapshot, so callers may `remove` while walking it.
    pub fn expired(&self, ttl: Duration, now: DateTime<Utc>) -> Vec<ObjectId> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let now_ms = now.timestamp_millis();
        self.entries()
            .iter()
            .filter(|(_, created_at)| {
                now_ms.saturating_sub(created_at.timestamp_millis()) > ttl_ms
            })
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Returns `true` if the entry was present.
    pub fn remove(&self, id: &ObjectId) -> bool {
        self.entries().remove(id).is_some()
    }

    #[cfg(test)]
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.entries().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}
