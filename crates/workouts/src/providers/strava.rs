//! Strava API v3 adapter
//!
//! OAuth2 bearer tokens, `after`/`page`/`per_page` pagination over
//! `/athlete/activities` (a JSON array per page), request-based cache keys.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::{ActivityProvider, DETAIL_TTL, FeedPage};
use crate::error::{Error, Result};
use crate::fetch::{AuthStyle, ConditionalFetcher, KeyStrategy};
use crate::models::{AccountId, ActivityRecord, Source};

/// Summary or detailed activity as returned by Strava
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StravaActivity {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub activity_type: Option<String>,
    #[serde(default)]
    pub sport_type: Option<String>,
    pub start_date: DateTime<Utc>,
    #[serde(default)]
    pub start_date_local: Option<String>,
    #[serde(default)]
    pub elapsed_time: i64,
    #[serde(default)]
    pub moving_time: i64,
    /// Meters
    #[serde(default)]
    pub distance: f64,
    #[serde(default)]
    pub total_elevation_gain: f64,
    /// m/s
    #[serde(default)]
    pub average_speed: f64,
    #[serde(default)]
    pub average_heartrate: Option<f64>,
    #[serde(default)]
    pub max_heartrate: Option<f64>,
    /// Only present on the detailed representation
    #[serde(default)]
    pub splits_metric: Vec<StravaSplit>,
}

impl StravaActivity {
    /// `sport_type` when present, else the legacy `type`
    pub fn sport(&self) -> &str {
        self.sport_type
            .as_deref()
            .or(self.activity_type.as_deref())
            .unwrap_or("Workout")
    }

    pub fn is_run(&self) -> bool {
        matches!(self.sport(), "Run" | "TrailRun" | "VirtualRun")
    }

    fn into_record(self, account_id: &AccountId, raw: serde_json::Value) -> ActivityRecord {
        let duration = if self.elapsed_time > 0 {
            self.elapsed_time
        } else {
            self.moving_time
        };
        ActivityRecord::builder(account_id.clone(), Source::Strava, self.id.to_string())
            .name(self.name.as_str())
            .sport(self.sport())
            .started_at(self.start_date)
            .duration_sec(duration)
            .distance_m(self.distance)
            .elevation_gain_m(self.total_elevation_gain)
            .avg_heart_rate(self.average_heartrate)
            .raw_payload(raw)
            .build()
    }
}

/// Per-kilometer split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StravaSplit {
    pub split: i32,
    #[serde(default)]
    pub distance: f64,
    #[serde(default)]
    pub elapsed_time: i64,
    #[serde(default)]
    pub moving_time: i64,
    #[serde(default)]
    pub average_speed: f64,
    #[serde(default)]
    pub elevation_difference: f64,
    #[serde(default)]
    pub pace_zone: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StravaLap {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub lap_index: i32,
    #[serde(default)]
    pub elapsed_time: i64,
    #[serde(default)]
    pub moving_time: i64,
    #[serde(default)]
    pub distance: f64,
    #[serde(default)]
    pub average_speed: f64,
    #[serde(default)]
    pub max_speed: f64,
    #[serde(default)]
    pub average_heartrate: Option<f64>,
    #[serde(default)]
    pub max_heartrate: Option<f64>,
    #[serde(default)]
    pub total_elevation_gain: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StravaStream {
    #[serde(default)]
    pub data: Vec<f64>,
}

/// Streams keyed by type; a stream the device did not record is empty
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StravaStreams {
    #[serde(default)]
    pub time: StravaStream,
    #[serde(default)]
    pub heartrate: StravaStream,
    #[serde(default)]
    pub velocity_smooth: StravaStream,
    #[serde(default)]
    pub distance: StravaStream,
    #[serde(default)]
    pub altitude: StravaStream,
}

/// Strava adapter
pub struct Strava {
    base_url: String,
    detail_ttl: TimeDelta,
}

impl Strava {
    pub const API_BASE: &'static str = "https://www.strava.com/api/v3";
    pub const PER_PAGE: u32 = 50;
    const STREAM_KEYS: &'static str = "time,heartrate,velocity_smooth,distance,altitude";

    pub fn new() -> Self {
        Self::with_base_url(Self::API_BASE)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            detail_ttl: DETAIL_TTL,
        }
    }

    /// Freshness window for detail lookups
    pub fn with_detail_ttl(mut self, ttl: TimeDelta) -> Self {
        self.detail_ttl = ttl;
        self
    }

    /// Most recent running activity among the latest ten
    pub fn latest_run(
        &self,
        fetcher: &ConditionalFetcher,
        account_id: &AccountId,
    ) -> Result<Option<StravaActivity>> {
        let activities: Vec<StravaActivity> = fetcher.fetch_json(
            account_id,
            self.feed_path(),
            &[("per_page", "10"), ("include_all_efforts", "true")],
            self.detail_ttl,
        )?;
        Ok(activities.into_iter().find(StravaActivity::is_run))
    }

    pub fn activity(
        &self,
        fetcher: &ConditionalFetcher,
        account_id: &AccountId,
        id: i64,
    ) -> Result<StravaActivity> {
        fetcher.fetch_json(
            account_id,
            &format!("/activities/{}", id),
            &[("include_all_efforts", "true")],
            self.detail_ttl,
        )
    }

    pub fn laps(
        &self,
        fetcher: &ConditionalFetcher,
        account_id: &AccountId,
        id: i64,
    ) -> Result<Vec<StravaLap>> {
        fetcher.fetch_json(
            account_id,
            &format!("/activities/{}/laps", id),
            &[],
            self.detail_ttl,
        )
    }

    pub fn streams(
        &self,
        fetcher: &ConditionalFetcher,
        account_id: &AccountId,
        id: i64,
    ) -> Result<StravaStreams> {
        fetcher.fetch_json(
            account_id,
            &format!("/activities/{}/streams", id),
            &[("keys", Self::STREAM_KEYS), ("key_by_type", "true")],
            self.detail_ttl,
        )
    }
}

impl Default for Strava {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityProvider for Strava {
    fn source(&self) -> Source {
        Source::Strava
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn auth_style(&self) -> AuthStyle {
        AuthStyle::Bearer
    }

    fn key_strategy(&self) -> KeyStrategy {
        KeyStrategy::Request
    }

    fn feed_path(&self) -> &'static str {
        "/athlete/activities"
    }

    fn page_params(&self, page: u32, since: DateTime<Utc>) -> Vec<(String, String)> {
        vec![
            ("after".to_string(), since.timestamp().to_string()),
            ("per_page".to_string(), Self::PER_PAGE.to_string()),
            ("page".to_string(), page.to_string()),
        ]
    }

    fn decode_page(
        &self,
        account_id: &AccountId,
        _since: DateTime<Utc>,
        body: &[u8],
    ) -> Result<FeedPage> {
        let items: Vec<serde_json::Value> = serde_json::from_slice(body)
            .map_err(|e| Error::decode("Strava activity page", e))?;
        let item_count = items.len();

        let records = items
            .into_iter()
            .map(|raw| {
                let activity: StravaActivity = serde_json::from_value(raw.clone())
                    .map_err(|e| Error::decode("Strava activity", e))?;
                Ok(activity.into_record(account_id, raw))
            })
            .collect::<Result<Vec<_>>>()?;

        // `after` is applied server-side, so only an empty page ends the feed
        Ok(FeedPage {
            records,
            item_count,
            exhausted: false,
        })
    }
}
