//! SQLite-based activity storage with zstd-compressed raw payloads

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use rusqlite_migration::{M, Migrations};

use super::ActivityStore;
use crate::auth::CredentialStore;
use crate::models::{
    AccountId, ActivityKey, ActivityRecord, Credential, Source, SyncWatermark,
};

/// Database migrations
///
/// Each migration is applied in order. The user_version pragma tracks which
/// migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: Initial schema
        M::up(
            r#"
            -- Synced activities, unique per upstream item
            CREATE TABLE activities (
                account_id TEXT NOT NULL,
                source TEXT NOT NULL,
                source_id TEXT NOT NULL,
                name TEXT,
                sport TEXT NOT NULL,
                started_at TEXT NOT NULL,
                duration_sec INTEGER NOT NULL,
                distance_m REAL,
                elevation_gain_m REAL,
                avg_heart_rate INTEGER,
                raw_payload BLOB NOT NULL,  -- zstd compressed JSON
                PRIMARY KEY (account_id, source, source_id)
            );

            CREATE INDEX idx_activities_started_at
                ON activities(account_id, started_at DESC);

            -- Incremental sync progress per account and source
            CREATE TABLE sync_watermarks (
                account_id TEXT NOT NULL,
                source TEXT NOT NULL,
                last_synced_at TEXT NOT NULL,
                PRIMARY KEY (account_id, source)
            );

            -- OAuth token material per account
            CREATE TABLE credentials (
                account_id TEXT PRIMARY KEY,
                access_token TEXT NOT NULL,
                refresh_token TEXT,
                expires_at TEXT NOT NULL
            );
            "#,
        ),
    ])
}

/// Fixed-width UTC timestamps so TEXT ordering matches time ordering
fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Invalid timestamp in database: {}", raw))
}

fn parse_source(raw: &str) -> Result<Source> {
    raw.parse::<Source>().map_err(|e| anyhow!(e))
}

/// Columns of `activities` as stored, before decoding
struct ActivityRow {
    account_id: String,
    source: String,
    source_id: String,
    name: Option<String>,
    sport: String,
    started_at: String,
    duration_sec: i64,
    distance_m: Option<f64>,
    elevation_gain_m: Option<f64>,
    avg_heart_rate: Option<i32>,
    raw_payload: Vec<u8>,
}

const ACTIVITY_COLUMNS: &str = "account_id, source, source_id, name, sport, started_at,
     duration_sec, distance_m, elevation_gain_m, avg_heart_rate, raw_payload";

impl ActivityRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            account_id: row.get(0)?,
            source: row.get(1)?,
            source_id: row.get(2)?,
            name: row.get(3)?,
            sport: row.get(4)?,
            started_at: row.get(5)?,
            duration_sec: row.get(6)?,
            distance_m: row.get(7)?,
            elevation_gain_m: row.get(8)?,
            avg_heart_rate: row.get(9)?,
            raw_payload: row.get(10)?,
        })
    }

    fn into_record(self) -> Result<ActivityRecord> {
        let payload =
            zstd::decode_all(self.raw_payload.as_slice()).context("Failed to decompress payload")?;
        let raw_payload =
            serde_json::from_slice(&payload).context("Failed to parse stored payload")?;

        Ok(ActivityRecord {
            account_id: AccountId::new(self.account_id),
            source: parse_source(&self.source)?,
            source_id: self.source_id,
            name: self.name,
            sport: self.sport,
            started_at: parse_timestamp(&self.started_at)?,
            duration_sec: self.duration_sec,
            distance_m: self.distance_m,
            elevation_gain_m: self.elevation_gain_m,
            avg_heart_rate: self.avg_heart_rate,
            raw_payload,
        })
    }
}

/// SQLite-based activity, watermark and credential storage
pub struct SqliteActivityStore {
    conn: Mutex<Connection>,
}

impl SqliteActivityStore {
    /// File name used under the data directory
    pub const DEFAULT_FILE: &'static str = "workouts.sqlite";

    /// Open (or create) the database at `db_path` and run migrations
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;

        // WAL lets readers proceed while a sync writes; NORMAL sync is safe
        // with WAL.
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -16000;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
            "#,
        )?;

        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open `workouts.sqlite` in the CoachGPT data directory
    pub fn open_default() -> Result<Self> {
        let path = config::data_path(Self::DEFAULT_FILE)
            .context("Could not determine data directory")?;
        if let Some(parent) = path.parent() {
            config::ensure_dir(parent)?;
        }
        Self::new(path)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database lock poisoned"))
    }
}

impl ActivityStore for SqliteActivityStore {
    fn upsert_activity(&self, record: ActivityRecord) -> Result<()> {
        let payload = serde_json::to_vec(&record.raw_payload)?;
        // level 3 = good balance of speed vs compression
        let compressed =
            zstd::encode_all(payload.as_slice(), 3).context("Failed to compress payload")?;

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO activities
             (account_id, source, source_id, name, sport, started_at, duration_sec,
              distance_m, elevation_gain_m, avg_heart_rate, raw_payload)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(account_id, source, source_id) DO UPDATE SET
                name = excluded.name,
                sport = excluded.sport,
                started_at = excluded.started_at,
                duration_sec = excluded.duration_sec,
                distance_m = excluded.distance_m,
                elevation_gain_m = excluded.elevation_gain_m,
                avg_heart_rate = excluded.avg_heart_rate,
                raw_payload = excluded.raw_payload",
            params![
                record.account_id.as_str(),
                record.source.as_str(),
                record.source_id,
                record.name,
                record.sport,
                timestamp(&record.started_at),
                record.duration_sec,
                record.distance_m,
                record.elevation_gain_m,
                record.avg_heart_rate,
                compressed,
            ],
        )?;

        Ok(())
    }

    fn get_activity(&self, key: &ActivityKey) -> Result<Option<ActivityRecord>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM activities
                     WHERE account_id = ? AND source = ? AND source_id = ?",
                    ACTIVITY_COLUMNS
                ),
                params![key.account_id.as_str(), key.source.as_str(), key.source_id],
                ActivityRow::from_row,
            )
            .optional()?;

        row.map(ActivityRow::into_record).transpose()
    }

    fn list_activities(
        &self,
        account_id: &AccountId,
        source: Option<Source>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ActivityRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM activities
             WHERE account_id = ?1 AND (?2 IS NULL OR source = ?2)
             ORDER BY started_at DESC, source_id ASC
             LIMIT ?3 OFFSET ?4",
            ACTIVITY_COLUMNS
        ))?;

        let rows = stmt
            .query_map(
                params![
                    account_id.as_str(),
                    source.map(|s| s.as_str()),
                    limit as i64,
                    offset as i64
                ],
                ActivityRow::from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter().map(ActivityRow::into_record).collect()
    }

    fn count_activities(&self, account_id: &AccountId) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM activities WHERE account_id = ?",
            [account_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn get_watermark(
        &self,
        account_id: &AccountId,
        source: Source,
    ) -> Result<Option<SyncWatermark>> {
        let conn = self.conn()?;
        let last_synced_at: Option<String> = conn
            .query_row(
                "SELECT last_synced_at FROM sync_watermarks WHERE account_id = ? AND source = ?",
                params![account_id.as_str(), source.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        last_synced_at
            .map(|raw| {
                Ok(SyncWatermark::new(
                    account_id.clone(),
                    source,
                    parse_timestamp(&raw)?,
                ))
            })
            .transpose()
    }

    fn save_watermark(&self, watermark: SyncWatermark) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sync_watermarks (account_id, source, last_synced_at)
             VALUES (?, ?, ?)
             ON CONFLICT(account_id, source) DO UPDATE SET
                last_synced_at = excluded.last_synced_at",
            params![
                watermark.account_id.as_str(),
                watermark.source.as_str(),
                timestamp(&watermark.last_synced_at),
            ],
        )?;
        Ok(())
    }

    fn delete_watermark(&self, account_id: &AccountId, source: Source) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM sync_watermarks WHERE account_id = ? AND source = ?",
            params![account_id.as_str(), source.as_str()],
        )?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
            DELETE FROM activities;
            DELETE FROM sync_watermarks;
            "#,
        )?;
        Ok(())
    }
}

impl CredentialStore for SqliteActivityStore {
    fn load(&self, account_id: &AccountId) -> Result<Option<Credential>> {
        let conn = self.conn()?;
        let row: Option<(String, Option<String>, String)> = conn
            .query_row(
                "SELECT access_token, refresh_token, expires_at
                 FROM credentials WHERE account_id = ?",
                [account_id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let Some((access_token, refresh_token, expires_at)) = row else {
            return Ok(None);
        };

        Ok(Some(Credential::new(
            account_id.clone(),
            access_token,
            refresh_token,
            parse_timestamp(&expires_at)?,
        )))
    }

    fn save(&self, credential: &Credential) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO credentials (account_id, access_token, refresh_token, expires_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(account_id) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                expires_at = excluded.expires_at",
            params![
                credential.account_id.as_str(),
                credential.access_token,
                credential.refresh_token,
                timestamp(&credential.expires_at),
            ],
        )?;
        Ok(())
    }

    fn delete(&self, account_id: &AccountId) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM credentials WHERE account_id = ?",
            [account_id.as_str()],
        )?;
        Ok(())
    }
}
