//! Sync watermark tracking for incremental activity sync

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AccountId, Source};

/// Latest point up to which an account's feed has been durably synced
///
/// Only one watermark per (account, source). Written after a sync walks
/// the whole feed; a sync that aborts mid-feed leaves it untouched so the
/// next attempt re-covers the unprocessed window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncWatermark {
    pub account_id: AccountId,
    pub source: Source,
    pub last_synced_at: DateTime<Utc>,
}

impl SyncWatermark {
    pub fn new(account_id: AccountId, source: Source, last_synced_at: DateTime<Utc>) -> Self {
        Self {
            account_id,
            source,
            last_synced_at,
        }
    }

    /// Watermark after a completed sync that started at `started_at`
    ///
    /// Never moves an existing watermark backward; a backward move is only
    /// possible through an explicit [`SyncWatermark::new`] by the caller.
    pub fn advanced(
        previous: Option<&SyncWatermark>,
        account_id: AccountId,
        source: Source,
        started_at: DateTime<Utc>,
    ) -> Self {
        let last_synced_at = previous
            .map(|p| p.last_synced_at.max(started_at))
            .unwrap_or(started_at);
        Self::new(account_id, source, last_synced_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn test_advanced_without_previous() {
        let now = Utc::now();
        let wm = SyncWatermark::advanced(None, AccountId::new("a"), Source::Strava, now);
        assert_eq!(wm.last_synced_at, now);
    }

    #[test]
    fn test_advanced_moves_forward() {
        let now = Utc::now();
        let prev = SyncWatermark::new(AccountId::new("a"), Source::Strava, now - TimeDelta::hours(1));
        let wm = SyncWatermark::advanced(Some(&prev), AccountId::new("a"), Source::Strava, now);
        assert_eq!(wm.last_synced_at, now);
    }

    #[test]
    fn test_advanced_never_moves_backward() {
        let now = Utc::now();
        let prev = SyncWatermark::new(AccountId::new("a"), Source::Strava, now + TimeDelta::hours(1));
        let wm = SyncWatermark::advanced(Some(&prev), AccountId::new("a"), Source::Strava, now);
        assert_eq!(wm.last_synced_at, prev.last_synced_at);
    }

    #[test]
    fn test_serialization() {
        let wm = SyncWatermark::new(AccountId::new("a"), Source::Hevy, Utc::now());
        let json = serde_json::to_string(&wm).unwrap();
        assert!(json.contains("\"hevy\""));
        let back: SyncWatermark = serde_json::from_str(&json).unwrap();
        assert_eq!(back, wm);
    }
}
