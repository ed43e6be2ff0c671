//! In-memory storage implementation
//!
//! Used by tests and by short-lived embeddings that do not need the
//! activities to outlive the process.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{Result, anyhow};

use super::ActivityStore;
use crate::models::{AccountId, ActivityKey, ActivityRecord, Source, SyncWatermark};

/// In-memory implementation of ActivityStore
///
/// Uses HashMaps protected by RwLocks for thread-safe access.
#[derive(Default)]
pub struct InMemoryActivityStore {
    activities: RwLock<HashMap<ActivityKey, ActivityRecord>>,
    watermarks: RwLock<HashMap<(AccountId, Source), SyncWatermark>>,
}

impl InMemoryActivityStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_activities(&self) -> Result<RwLockReadGuard<'_, HashMap<ActivityKey, ActivityRecord>>> {
        self.activities
            .read()
            .map_err(|_| anyhow!("activity lock poisoned"))
    }

    fn write_activities(
        &self,
    ) -> Result<RwLockWriteGuard<'_, HashMap<ActivityKey, ActivityRecord>>> {
        self.activities
            .write()
            .map_err(|_| anyhow!("activity lock poisoned"))
    }

    fn write_watermarks(
        &self,
    ) -> Result<RwLockWriteGuard<'_, HashMap<(AccountId, Source), SyncWatermark>>> {
        self.watermarks
            .write()
            .map_err(|_| anyhow!("watermark lock poisoned"))
    }
}

impl ActivityStore for InMemoryActivityStore {
    fn upsert_activity(&self, record: ActivityRecord) -> Result<()> {
        self.write_activities()?.insert(record.key(), record);
        Ok(())
    }

    fn get_activity(&self, key: &ActivityKey) -> Result<Option<ActivityRecord>> {
        Ok(self.read_activities()?.get(key).cloned())
    }

    fn list_activities(
        &self,
        account_id: &AccountId,
        source: Option<Source>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ActivityRecord>> {
        let activities = self.read_activities()?;
        let mut records: Vec<ActivityRecord> = activities
            .values()
            .filter(|r| &r.account_id == account_id)
            .filter(|r| source.is_none_or(|s| r.source == s))
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            b.started_at
                .cmp(&a.started_at)
                .then_with(|| a.source_id.cmp(&b.source_id))
        });
        Ok(records.into_iter().skip(offset).take(limit).collect())
    }

    fn count_activities(&self, account_id: &AccountId) -> Result<usize> {
        Ok(self
            .read_activities()?
            .keys()
            .filter(|k| &k.account_id == account_id)
            .count())
    }

    fn get_watermark(
        &self,
        account_id: &AccountId,
        source: Source,
    ) -> Result<Option<SyncWatermark>> {
        let watermarks = self
            .watermarks
            .read()
            .map_err(|_| anyhow!("watermark lock poisoned"))?;
        Ok(watermarks.get(&(account_id.clone(), source)).cloned())
    }

    fn save_watermark(&self, watermark: SyncWatermark) -> Result<()> {
        self.write_watermarks()?.insert(
            (watermark.account_id.clone(), watermark.source),
            watermark,
        );
        Ok(())
    }

    fn delete_watermark(&self, account_id: &AccountId, source: Source) -> Result<()> {
        self.write_watermarks()?
            .remove(&(account_id.clone(), source));
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.write_activities()?.clear();
        self.write_watermarks()?.clear();
        Ok(())
    }
}
