//! HTTP response cache
//!
//! A key/value store of response bodies plus the metadata needed for
//! freshness checks and conditional revalidation. Entries are overwritten
//! on every successful fetch or revalidation and never explicitly deleted.

mod file;
pub mod key;
mod memory;

pub use file::FileCache;
pub use key::{key_for, key_for_account, key_for_url};
pub use memory::InMemoryCache;

use anyhow::Result;
use chrono::{DateTime, TimeDelta, Utc};

/// A cached response body with its validator
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub etag: Option<String>,
    /// Stamped by the store on write; whatever the caller sets is replaced
    pub fetched_at: DateTime<Utc>,
    pub body: Vec<u8>,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            etag: None,
            fetched_at: DateTime::<Utc>::UNIX_EPOCH,
            body: body.into(),
        }
    }

    pub fn with_etag(mut self, etag: Option<String>) -> Self {
        self.etag = etag.filter(|e| !e.is_empty());
        self
    }

    /// Whether the entry may be served for a read with `max_age`
    ///
    /// A zero (or negative) `max_age` accepts any age.
    pub fn is_within(&self, now: DateTime<Utc>, max_age: TimeDelta) -> bool {
        max_age <= TimeDelta::zero() || now - self.fetched_at <= max_age
    }
}

/// Cache backend
///
/// Implementations must make each `write` atomic per key: a concurrent
/// reader sees either the previous entry or the new one, never a mix.
pub trait Cache: Send + Sync {
    /// Entry for `key` if present and no older than `max_age`
    fn read(&self, key: &str, max_age: TimeDelta) -> Result<Option<CacheEntry>>;

    /// Persist `entry`, stamping `fetched_at` with the current time
    fn write(&self, entry: CacheEntry) -> Result<CacheEntry>;

    /// ETag of the entry for `key` at any age
    fn etag(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .read(key, TimeDelta::zero())?
            .and_then(|entry| entry.etag))
    }

    /// Key for a logical request
    fn key_for(&self, path: &str, params: &[(&str, &str)]) -> String {
        key::key_for(path, params.iter().copied())
    }
}
