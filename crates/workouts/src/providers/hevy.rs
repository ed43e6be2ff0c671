//! Hevy API adapter
//!
//! Static `api-key` header, `page`/`pageSize` pagination over
//! `/v1/workouts`. The feed has no time filter, so the window is applied
//! client-side: workouts arrive newest first, and the first one older than
//! the window start means every later page is older too.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::{ActivityProvider, DETAIL_TTL, FeedPage};
use crate::error::{Error, Result};
use crate::fetch::{AuthStyle, ConditionalFetcher, KeyStrategy};
use crate::models::{AccountId, ActivityRecord, Source};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HevyWorkoutPage {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub page_count: u32,
    #[serde(default)]
    pub workouts: Vec<HevyWorkout>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HevyWorkout {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub exercises: Vec<HevyExercise>,
}

impl HevyWorkout {
    /// Sum of per-set distances (cardio exercises logged in Hevy)
    pub fn total_distance_m(&self) -> f64 {
        self.exercises
            .iter()
            .flat_map(|e| e.sets.iter())
            .filter_map(|s| s.distance_meters)
            .sum()
    }

    fn into_record(self, account_id: &AccountId, raw: serde_json::Value) -> ActivityRecord {
        let duration = (self.end_time - self.start_time).num_seconds().max(0);
        ActivityRecord::builder(account_id.clone(), Source::Hevy, self.id.as_str())
            .name(self.title.as_str())
            .sport(Hevy::SPORT)
            .started_at(self.start_time)
            .duration_sec(duration)
            .distance_m(self.total_distance_m())
            .raw_payload(raw)
            .build()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HevyExercise {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub exercise_template_id: Option<String>,
    #[serde(default)]
    pub superset_id: Option<serde_json::Value>,
    #[serde(default)]
    pub sets: Vec<HevySet>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HevySet {
    #[serde(default)]
    pub index: u32,
    /// "normal", "warmup", "dropset", "failure"
    #[serde(rename = "type", default)]
    pub set_type: String,
    #[serde(default)]
    pub weight_kg: Option<f64>,
    #[serde(default)]
    pub reps: Option<u32>,
    #[serde(default)]
    pub distance_meters: Option<f64>,
    #[serde(default)]
    pub duration_seconds: Option<u32>,
    #[serde(default)]
    pub rpe: Option<f64>,
}

/// Hevy adapter
pub struct Hevy {
    base_url: String,
    detail_ttl: TimeDelta,
}

impl Hevy {
    pub const API_BASE: &'static str = "https://api.hevyapp.com";
    /// Largest page size the API accepts
    pub const PAGE_SIZE: u32 = 10;
    const SPORT: &'static str = "WeightTraining";

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

    /// First workout of page one, if any
    pub fn latest_workout(
        &self,
        fetcher: &ConditionalFetcher,
        account_id: &AccountId,
    ) -> Result<Option<HevyWorkout>> {
        let page: HevyWorkoutPage =
            fetcher.fetch_json(account_id, self.feed_path(), &[("page", "1")], self.detail_ttl)?;
        Ok(page.workouts.into_iter().next())
    }
}

impl Default for Hevy {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityProvider for Hevy {
    fn source(&self) -> Source {
        Source::Hevy
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn auth_style(&self) -> AuthStyle {
        AuthStyle::Header("api-key")
    }

    fn key_strategy(&self) -> KeyStrategy {
        KeyStrategy::Url
    }

    fn feed_path(&self) -> &'static str {
        "/v1/workouts"
    }

    fn page_params(&self, page: u32, _since: DateTime<Utc>) -> Vec<(String, String)> {
        vec![
            ("page".to_string(), page.to_string()),
            ("pageSize".to_string(), Self::PAGE_SIZE.to_string()),
        ]
    }

    fn decode_page(
        &self,
        account_id: &AccountId,
        since: DateTime<Utc>,
        body: &[u8],
    ) -> Result<FeedPage> {
        #[derive(Deserialize)]
        struct RawPage {
            #[serde(default)]
            page: u32,
            #[serde(default)]
            page_count: u32,
            #[serde(default)]
            workouts: Vec<serde_json::Value>,
        }

        let raw: RawPage =
            serde_json::from_slice(body).map_err(|e| Error::decode("Hevy workout page", e))?;
        let item_count = raw.workouts.len();
        let mut exhausted = raw.page_count > 0 && raw.page >= raw.page_count;

        let mut records = Vec::with_capacity(item_count);
        for item in raw.workouts {
            let workout: HevyWorkout = serde_json::from_value(item.clone())
                .map_err(|e| Error::decode("Hevy workout", e))?;
            if workout.start_time < since {
                exhausted = true;
                continue;
            }
            records.push(workout.into_record(account_id, item));
        }

        Ok(FeedPage {
            records,
            item_count,
            exhausted,
        })
    }
}
