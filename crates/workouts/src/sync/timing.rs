//! Sync timing utilities for windows and cooldowns
//!
//! Pure functions that can be tested without a clock or network.

use chrono::{DateTime, TimeDelta, Utc};

/// Start of the window a sync should cover when the caller gives no `since`.
///
/// With a watermark the window reaches back `overlap` before it, so items
/// created upstream while the previous sync ran are picked up again (upserts
/// make the re-read harmless). Without one it reaches back `lookback`.
pub fn sync_window_start(
    watermark: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    overlap: TimeDelta,
    lookback: TimeDelta,
) -> DateTime<Utc> {
    match watermark {
        Some(last) => last - overlap,
        None => now - lookback,
    }
}

/// Check if enough time has elapsed since the last sync to allow a new sync.
///
/// # Arguments
/// * `last_sync_at` - When the last successful sync started (None if never synced)
/// * `now` - Current time
/// * `cooldown_secs` - Minimum seconds that must elapse between syncs
///
/// # Returns
/// `true` if enough time has passed (or never synced), `false` if still in cooldown
pub fn cooldown_elapsed(
    last_sync_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    cooldown_secs: u64,
) -> bool {
    match last_sync_at {
        Some(last) => (now - last).num_seconds() >= cooldown_secs as i64,
        None => true, // Never synced, so cooldown has "elapsed"
    }
}
