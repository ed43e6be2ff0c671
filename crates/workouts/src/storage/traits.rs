//! Storage trait definitions

use anyhow::Result;

use crate::models::{AccountId, ActivityKey, ActivityRecord, Source, SyncWatermark};

/// Persistence sink for synced activities and sync progress
///
/// Upserts are idempotent: writing a record whose
/// `(account_id, source, source_id)` already exists replaces it in place.
pub trait ActivityStore: Send + Sync {
    /// Insert or update an activity
    fn upsert_activity(&self, record: ActivityRecord) -> Result<()>;

    fn get_activity(&self, key: &ActivityKey) -> Result<Option<ActivityRecord>>;

    /// Activities for an account ordered by `started_at` descending,
    /// optionally limited to one source
    fn list_activities(
        &self,
        account_id: &AccountId,
        source: Option<Source>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ActivityRecord>>;

    fn count_activities(&self, account_id: &AccountId) -> Result<usize>;

    fn get_watermark(&self, account_id: &AccountId, source: Source)
    -> Result<Option<SyncWatermark>>;

    /// Save the watermark (upsert)
    fn save_watermark(&self, watermark: SyncWatermark) -> Result<()>;

    /// Forget sync progress so the next sync starts from the lookback window
    fn delete_watermark(&self, account_id: &AccountId, source: Source) -> Result<()>;

    /// Clear all data (for testing)
    fn clear(&self) -> Result<()>;
}
