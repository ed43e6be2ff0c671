//! Activity record model produced by the sync engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::AccountId;

/// Upstream platform an activity was ingested from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Strava,
    Hevy,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Strava => "strava",
            Source::Hevy => "hevy",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strava" => Ok(Source::Strava),
            "hevy" => Ok(Source::Hevy),
            other => Err(format!("unknown activity source: {other}")),
        }
    }
}

/// Natural key of an activity: unique per (account, source, upstream id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActivityKey {
    pub account_id: AccountId,
    pub source: Source,
    pub source_id: String,
}

impl ActivityKey {
    pub fn new(account_id: AccountId, source: Source, source_id: impl Into<String>) -> Self {
        Self {
            account_id,
            source,
            source_id: source_id.into(),
        }
    }
}

/// A workout retrieved from an upstream platform
///
/// Re-ingesting the same `(account_id, source, source_id)` updates the
/// stored record in place; it never creates a second row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub account_id: AccountId,
    pub source: Source,
    pub source_id: String,
    pub name: Option<String>,
    /// Upstream sport/type label (e.g. "Run", "TrailRun", "Strength")
    pub sport: String,
    pub started_at: DateTime<Utc>,
    pub duration_sec: i64,
    pub distance_m: Option<f64>,
    pub elevation_gain_m: Option<f64>,
    pub avg_heart_rate: Option<i32>,
    /// The upstream item exactly as received
    pub raw_payload: serde_json::Value,
}

impl ActivityRecord {
    /// Start building a record with its natural key
    pub fn builder(
        account_id: AccountId,
        source: Source,
        source_id: impl Into<String>,
    ) -> ActivityRecordBuilder {
        ActivityRecordBuilder {
            record: ActivityRecord {
                account_id,
                source,
                source_id: source_id.into(),
                name: None,
                sport: String::new(),
                started_at: DateTime::<Utc>::UNIX_EPOCH,
                duration_sec: 0,
                distance_m: None,
                elevation_gain_m: None,
                avg_heart_rate: None,
                raw_payload: serde_json::Value::Null,
            },
        }
    }

    pub fn key(&self) -> ActivityKey {
        ActivityKey::new(self.account_id.clone(), self.source, self.source_id.clone())
    }
}

/// Builder for [`ActivityRecord`]
pub struct ActivityRecordBuilder {
    record: ActivityRecord,
}

impl ActivityRecordBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.record.name = if name.is_empty() { None } else { Some(name) };
        self
    }

    pub fn sport(mut self, sport: impl Into<String>) -> Self {
        self.record.sport = sport.into();
        self
    }

    pub fn started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.record.started_at = started_at;
        self
    }

    pub fn duration_sec(mut self, duration_sec: i64) -> Self {
        self.record.duration_sec = duration_sec;
        self
    }

    /// Zero or negative distances are recorded as absent
    pub fn distance_m(mut self, distance_m: f64) -> Self {
        self.record.distance_m = positive(distance_m);
        self
    }

    pub fn elevation_gain_m(mut self, elevation_gain_m: f64) -> Self {
        self.record.elevation_gain_m = positive(elevation_gain_m);
        self
    }

    pub fn avg_heart_rate(mut self, avg_heart_rate: Option<f64>) -> Self {
        self.record.avg_heart_rate = avg_heart_rate
            .map(|hr| hr as i32)
            .filter(|hr| *hr > 0);
        self
    }

    pub fn raw_payload(mut self, raw_payload: serde_json::Value) -> Self {
        self.record.raw_payload = raw_payload;
        self
    }

    pub fn build(self) -> ActivityRecord {
        self.record
    }
}

fn positive(value: f64) -> Option<f64> {
    (value > 0.0).then_some(value)
}
