//! Configuration loading for the sync worker
//!
//! Settings are read from (later sources win):
//! 1. Built-in defaults
//! 2. `~/.config/coachgpt/config.json`
//! 3. Compile-time embedded Strava client credentials (for release builds)
//! 4. Runtime environment variables

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::models::Source;
use crate::providers::{DETAIL_TTL, Hevy, Strava};
use crate::sync::SyncOptions;

/// Config filename in the CoachGPT config directory
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StravaSettings {
    pub client_id: String,
    pub client_secret: String,
    pub api_base: String,
    pub token_url: String,
}

impl Default for StravaSettings {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            api_base: Strava::API_BASE.to_string(),
            token_url: crate::auth::OAuthClient::STRAVA_TOKEN_URL.to_string(),
        }
    }
}

impl StravaSettings {
    pub fn has_client_credentials(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HevySettings {
    pub api_key: String,
    pub api_base: String,
}

impl Default for HevySettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: Hevy::API_BASE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub overlap_hours: i64,
    pub lookback_days: i64,
    /// Refresh tokens with less than this many seconds left
    pub refresh_margin_secs: i64,
    /// Minimum seconds between scheduled syncs of one account
    pub cooldown_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            overlap_hours: 12,
            lookback_days: 14,
            refresh_margin_secs: 120,
            cooldown_secs: 15 * 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    /// Skip cache reads (responses are still written)
    pub no_cache: bool,
    /// Defaults to `~/.cache/coachgpt`
    pub dir: Option<PathBuf>,
    /// Freshness window for detail lookups
    pub ttl_hours: i64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            no_cache: false,
            dir: None,
            ttl_hours: DETAIL_TTL.num_hours(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self { timeout_secs: 20 }
    }
}

/// All worker settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub strava: StravaSettings,
    pub hevy: HevySettings,
    pub sync: SyncSettings,
    pub cache: CacheSettings,
    pub http: HttpSettings,
}

impl AppConfig {
    /// Load from the default config file (if present), then apply embedded
    /// credentials and environment overrides
    pub fn load() -> Result<Self> {
        let mut cfg = if config::config_exists(CONFIG_FILE) {
            config::load_json(CONFIG_FILE)
                .with_context(|| format!("Failed to load {}", CONFIG_FILE))?
        } else {
            Self::default()
        };
        cfg.apply_compile_time();
        cfg.apply_env(|key| std::env::var(key).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from a specific JSON file without environment overrides
    pub fn load_from(path: &Path) -> Result<Self> {
        let cfg: Self = config::load_json_file(path)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse settings from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json).context("Failed to parse config JSON")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Write to the default config file
    pub fn save(&self) -> Result<()> {
        config::save_json(CONFIG_FILE, self)
    }

    /// Get the default config file path (~/.config/coachgpt/config.json)
    pub fn default_path() -> Option<PathBuf> {
        config::config_path(CONFIG_FILE)
    }

    /// Strava client credentials embedded at build time.
    /// Build with: STRAVA_CLIENT_ID=xxx STRAVA_CLIENT_SECRET=yyy cargo build --release
    fn apply_compile_time(&mut self) {
        if let (Some(id), Some(secret)) = (
            option_env!("STRAVA_CLIENT_ID"),
            option_env!("STRAVA_CLIENT_SECRET"),
        ) && !id.is_empty()
            && !secret.is_empty()
        {
            self.strava.client_id = id.to_string();
            self.strava.client_secret = secret.to_string();
        }
    }

    /// Apply environment overrides through `lookup` (normally `std::env::var`)
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(id) = non_empty("STRAVA_CLIENT_ID") {
            self.strava.client_id = id;
        }
        if let Some(secret) = non_empty("STRAVA_CLIENT_SECRET") {
            self.strava.client_secret = secret;
        }
        if let Some(key) = non_empty("HEVY_API_KEY") {
            self.hevy.api_key = key;
        }
        if ["COACH_NOCACHE", "STRAVA_NOCACHE"]
            .iter()
            .any(|key| non_empty(key).is_some_and(|v| is_truthy(&v)))
        {
            self.cache.no_cache = true;
        }
        if let Some(raw) = non_empty("COACH_HTTP_TIMEOUT_SECS") {
            self.http.timeout_secs = raw
                .trim()
                .parse()
                .with_context(|| format!("COACH_HTTP_TIMEOUT_SECS is not a number: {}", raw))?;
        }
        Ok(())
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.http.timeout_secs == 0 {
            bail!("http.timeout_secs must be greater than zero");
        }
        if self.sync.overlap_hours < 0 {
            bail!("sync.overlap_hours must not be negative");
        }
        if self.sync.lookback_days <= 0 {
            bail!("sync.lookback_days must be greater than zero");
        }
        if self.sync.refresh_margin_secs < 0 {
            bail!("sync.refresh_margin_secs must not be negative");
        }
        if self.cache.ttl_hours < 0 {
            bail!("cache.ttl_hours must not be negative");
        }
        Ok(())
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            overlap: TimeDelta::hours(self.sync.overlap_hours),
            lookback: TimeDelta::days(self.sync.lookback_days),
        }
    }

    pub fn refresh_margin(&self) -> TimeDelta {
        TimeDelta::seconds(self.sync.refresh_margin_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_secs)
    }

    pub fn detail_ttl(&self) -> TimeDelta {
        TimeDelta::hours(self.cache.ttl_hours)
    }

    /// Cache directory for one provider, `None` when caching is disabled
    pub fn cache_dir(&self, source: Source) -> Option<PathBuf> {
        if !self.cache.enabled {
            return None;
        }
        let root = self.cache.dir.clone().or_else(config::cache_dir)?;
        Some(root.join(source.as_str()))
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
