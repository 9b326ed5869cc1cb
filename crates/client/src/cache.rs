//! Response cache keyed by request path.
//!
//! Each entry carries the resource kinds it was built from. A mutation invalidates the kinds
//! it touched, which drops every entry tagged with one of them and tells subscribers of the
//! client bus to re-fetch. Entries also go stale after a fixed time, so edits made by other
//! clients are picked up on the next read.

use api_shared::AuditAction;
use opd_core::{ChangeBus, ChangeEvent, ResourceKind};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// How long a response is served from the cache before it is fetched again.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(30);

struct CacheEntry {
    value: Value,
    tags: BTreeSet<ResourceKind>,
    fetched_at: Instant,
}

pub struct QueryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    bus: ChangeBus,
    stale_after: Duration,
}

impl QueryCache {
    pub fn new(bus: ChangeBus) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            bus,
            stale_after: DEFAULT_STALE_AFTER,
        }
    }

    /// Sets the entry lifetime. Zero disables caching.
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    pub fn bus(&self) -> &ChangeBus {
        &self.bus
    }

    // A poisoned lock only means another thread panicked mid-update; the map is still usable
    // as a cache.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Cached value for `key`, if present, fresh and still decodable as `T`.
    ///
    /// A stale entry is dropped so the caller refetches it.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = {
            let mut entries = self.lock();
            let entry = entries.get(key)?;
            if entry.fetched_at.elapsed() >= self.stale_after {
                entries.remove(key);
                tracing::debug!(key, "cache entry stale");
                return None;
            }
            entry.value.clone()
        };
        serde_json::from_value(value).ok()
    }

    pub fn insert<T: Serialize>(&self, key: &str, tags: &[ResourceKind], value: &T) {
        let Ok(value) = serde_json::to_value(value) else {
            return;
        };
        self.lock().insert(
            key.to_string(),
            CacheEntry {
                value,
                tags: tags.iter().copied().collect(),
                fetched_at: Instant::now(),
            },
        );
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every entry tagged with one of `kinds` and publishes one change per kind.
    ///
    /// Returns the number of entries dropped.
    pub fn invalidate(&self, kinds: &[ResourceKind]) -> usize {
        let dropped = {
            let mut entries = self.lock();
            let before = entries.len();
            entries.retain(|_, entry| !kinds.iter().any(|k| entry.tags.contains(k)));
            before - entries.len()
        };

        tracing::debug!(?kinds, dropped, "cache invalidated");
        for kind in kinds {
            self.bus
                .publish(ChangeEvent::new(*kind, None, AuditAction::Update));
        }
        dropped
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}
