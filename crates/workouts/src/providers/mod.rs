//! Upstream platform adapters
//!
//! Each adapter supplies what differs between platforms: endpoint, auth
//! header, cache key strategy, page parameters and page decoding. One
//! [`crate::fetch::ConditionalFetcher`] and one [`crate::sync::SyncEngine`]
//! serve every adapter.

mod hevy;
mod strava;

pub use hevy::{Hevy, HevyExercise, HevySet, HevyWorkout, HevyWorkoutPage};
pub use strava::{Strava, StravaActivity, StravaLap, StravaSplit, StravaStream, StravaStreams};

use chrono::{DateTime, TimeDelta, Utc};

use crate::error::Result;
use crate::fetch::{AuthStyle, FetcherConfig, KeyStrategy};
use crate::models::{AccountId, ActivityRecord, Source};

/// Freshness window for single-resource lookups (latest run, laps, ...)
pub const DETAIL_TTL: TimeDelta = TimeDelta::hours(24);

/// One decoded page of an activity feed
#[derive(Debug, Clone, Default)]
pub struct FeedPage {
    /// Records to upsert (already filtered to the sync window)
    pub records: Vec<ActivityRecord>,
    /// Raw item count before any filtering; zero ends the feed
    pub item_count: usize,
    /// The adapter knows no later page can hold relevant items
    pub exhausted: bool,
}

/// Adapter for one upstream activity feed
pub trait ActivityProvider: Send + Sync {
    fn source(&self) -> Source;

    fn base_url(&self) -> &str;

    fn auth_style(&self) -> AuthStyle;

    fn key_strategy(&self) -> KeyStrategy;

    /// Path of the paginated activity list
    fn feed_path(&self) -> &'static str;

    /// Query parameters for 1-based `page` of activities since `since`
    fn page_params(&self, page: u32, since: DateTime<Utc>) -> Vec<(String, String)>;

    /// Decode a feed page body into records for `account_id`
    fn decode_page(
        &self,
        account_id: &AccountId,
        since: DateTime<Utc>,
        body: &[u8],
    ) -> Result<FeedPage>;

    /// Fetcher settings for this upstream
    fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig::new(self.base_url())
            .auth(self.auth_style())
            .key_strategy(self.key_strategy())
    }
}

/// Borrow owned query pairs as the `&[(&str, &str)]` the fetcher takes
pub(crate) fn borrow_params(params: &[(String, String)]) -> Vec<(&str, &str)> {
    params
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect()
}
