//! File-based response cache
//!
//! One JSON document per key. Bodies are stored base64-encoded so binary
//! payloads survive; writes go through a temp file and a rename.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::{Cache, CacheEntry};
use crate::clock::{self, Clock};

/// On-disk representation of a [`CacheEntry`]
#[derive(Serialize, Deserialize)]
struct StoredEntry {
    key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    etag: Option<String>,
    fetched_at: DateTime<Utc>,
    body: String,
}

/// Directory-backed cache
///
/// Directory structure:
/// ```text
/// cache/
///   strava/
///     athlete_activities-3f2a....json
///   hevy/
///     api.hevyapp.com_v1_workouts-9c1d....json
/// ```
pub struct FileCache {
    root: PathBuf,
    clock: Arc<dyn Clock>,
}

impl FileCache {
    /// Create a cache rooted at `root`, creating the directory if needed
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        Self::with_clock(root, clock::system())
    }

    pub fn with_clock(root: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create cache directory {}", root.display()))?;
        Ok(Self { root, clock })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        // Keys from the key generator are already file-safe; sanitize again
        // for keys built by hand.
        self.root.join(format!("{}.json", super::key::sanitize(key)))
    }
}

impl Cache for FileCache {
    fn read(&self, key: &str, max_age: TimeDelta) -> Result<Option<CacheEntry>> {
        let path = self.entry_path(key);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };

        let stored: StoredEntry = serde_json::from_slice(&data)
            .with_context(|| format!("Corrupt cache entry {}", path.display()))?;
        let body = STANDARD
            .decode(stored.body.as_bytes())
            .with_context(|| format!("Corrupt cache body {}", path.display()))?;

        let entry = CacheEntry {
            key: stored.key,
            etag: stored.etag,
            fetched_at: stored.fetched_at,
            body,
        };

        if entry.is_within(self.clock.now(), max_age) {
            Ok(Some(entry))
        } else {
            Ok(None)
        }
    }

    fn write(&self, mut entry: CacheEntry) -> Result<CacheEntry> {
        entry.fetched_at = self.clock.now();

        let stored = StoredEntry {
            key: entry.key.clone(),
            etag: entry.etag.clone(),
            fetched_at: entry.fetched_at,
            body: STANDARD.encode(&entry.body),
        };
        let json = serde_json::to_vec(&stored).context("Failed to serialize cache entry")?;
        config::write_atomic(&self.entry_path(&entry.key), &json)?;

        Ok(entry)
    }
}
