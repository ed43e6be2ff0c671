//! In-memory response cache
//!
//! Used by tests and by callers that want revalidation within a single
//! process without touching disk.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::{Result, anyhow};
use chrono::TimeDelta;

use super::{Cache, CacheEntry};
use crate::clock::{self, Clock};

pub struct InMemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::with_clock(clock::system())
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Number of stored entries (fresh or stale)
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache for InMemoryCache {
    fn read(&self, key: &str, max_age: TimeDelta) -> Result<Option<CacheEntry>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| anyhow!("cache lock poisoned"))?;
        let now = self.clock.now();
        Ok(entries
            .get(key)
            .filter(|entry| entry.is_within(now, max_age))
            .cloned())
    }

    fn write(&self, mut entry: CacheEntry) -> Result<CacheEntry> {
        entry.fetched_at = self.clock.now();
        let mut entries = self
            .entries
            .write()
            .map_err(|_| anyhow!("cache lock poisoned"))?;
        entries.insert(entry.key.clone(), entry.clone());
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Utc;

    #[test]
    fn test_round_trip_and_staleness() {
        let clock = ManualClock::shared(Utc::now());
        let cache = InMemoryCache::with_clock(clock.clone());

        cache
            .write(CacheEntry::new("k", "v").with_etag(Some("e1".into())))
            .unwrap();
        assert_eq!(cache.len(), 1);
        assert!(cache.read("k", TimeDelta::minutes(5)).unwrap().is_some());

        clock.advance(TimeDelta::minutes(10));
        assert!(cache.read("k", TimeDelta::minutes(5)).unwrap().is_none());
        assert!(cache.read("k", TimeDelta::zero()).unwrap().is_some());
        assert_eq!(cache.etag("k").unwrap().as_deref(), Some("e1"));
    }

    #[test]
    fn test_default_key_for_matches_generator() {
        let cache = InMemoryCache::new();
        assert_eq!(
            cache.key_for("/athlete/activities", &[("page", "1"), ("per_page", "50")]),
            crate::cache::key_for("/athlete/activities", [("per_page", "50"), ("page", "1")])
        );
    }
}
