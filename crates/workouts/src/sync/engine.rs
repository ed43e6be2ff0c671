//! Incremental activity sync
//!
//! Walks a provider's paginated feed from a watermark, upserting every item,
//! and advances the watermark only once the whole feed was read. A run that
//! fails part-way leaves the watermark untouched; re-running it re-reads the
//! same window and the upserts make that harmless.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, info, warn};
use rayon::prelude::*;

use super::timing::sync_window_start;
use crate::clock::{self, Clock};
use crate::error::{Error, Result};
use crate::fetch::ConditionalFetcher;
use crate::models::{AccountId, Source, SyncWatermark};
use crate::providers::{ActivityProvider, borrow_params};
use crate::storage::ActivityStore;

/// Window tuning for syncs without an explicit `since`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncOptions {
    /// How far before the watermark each sync starts reading
    pub overlap: TimeDelta,
    /// Window for an account that was never synced
    pub lookback: TimeDelta,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            overlap: TimeDelta::hours(12),
            lookback: TimeDelta::days(14),
        }
    }
}

/// Statistics from a sync operation
#[derive(Debug, Clone, PartialEq)]
pub struct SyncStats {
    pub account_id: AccountId,
    pub source: Source,
    /// Start of the window that was read
    pub since: DateTime<Utc>,
    /// When this sync started; becomes the new watermark
    pub started_at: DateTime<Utc>,
    /// Number of feed pages requested, including the terminating one
    pub pages_fetched: u32,
    /// Number of records written (inserted or updated)
    pub activities_upserted: usize,
    /// Duration of the sync operation
    pub duration_ms: u64,
}

/// Sync engine for one upstream provider
pub struct SyncEngine {
    provider: Arc<dyn ActivityProvider>,
    fetcher: ConditionalFetcher,
    store: Arc<dyn ActivityStore>,
    clock: Arc<dyn Clock>,
    options: SyncOptions,
    in_flight: Mutex<HashSet<AccountId>>,
}

/// Marks an account as syncing until dropped
struct InFlight<'a> {
    engine: &'a SyncEngine,
    account_id: AccountId,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut in_flight = self
            .engine
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        in_flight.remove(&self.account_id);
    }
}

impl SyncEngine {
    pub fn new(
        provider: Arc<dyn ActivityProvider>,
        fetcher: ConditionalFetcher,
        store: Arc<dyn ActivityStore>,
    ) -> Self {
        Self {
            provider,
            fetcher,
            store,
            clock: clock::system(),
            options: SyncOptions::default(),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    pub fn source(&self) -> Source {
        self.provider.source()
    }

    pub fn fetcher(&self) -> &ConditionalFetcher {
        &self.fetcher
    }

    pub fn store(&self) -> &Arc<dyn ActivityStore> {
        &self.store
    }

    /// Sync one account's feed since `since` (or the watermark window).
    ///
    /// Idempotent: re-running with no new upstream data leaves the stored
    /// records unchanged.
    pub fn sync_account(
        &self,
        account_id: &AccountId,
        since: Option<DateTime<Utc>>,
    ) -> Result<SyncStats> {
        let started_at = self.clock.now();
        if account_id.as_str().is_empty() {
            return Err(Error::InvalidArgument {
                message: "account id must not be empty".to_string(),
            });
        }
        if let Some(since) = since
            && since > started_at
        {
            return Err(Error::InvalidArgument {
                message: format!("since {} is in the future", since),
            });
        }

        let _in_flight = self.begin(account_id)?;

        let timer = Instant::now();
        let source = self.source();
        let previous = self.store.get_watermark(account_id, source)?;

        let explicit = since.is_some();
        let since = since.unwrap_or_else(|| {
            sync_window_start(
                previous.as_ref().map(|w| w.last_synced_at),
                started_at,
                self.options.overlap,
                self.options.lookback,
            )
        });

        info!(
            "[SYNC] Starting {} sync for {} since {}",
            source, account_id, since
        );

        // Surface missing or unrefreshable credentials before paging
        self.fetcher.tokens().access_token(account_id)?;

        let mut stats = SyncStats {
            account_id: account_id.clone(),
            source,
            since,
            started_at,
            pages_fetched: 0,
            activities_upserted: 0,
            duration_ms: 0,
        };

        let mut page = 1;
        loop {
            let params = self.provider.page_params(page, since);
            let feed = self
                .fetcher
                .fetch_fresh(
                    account_id,
                    self.provider.feed_path(),
                    &borrow_params(&params),
                    |body| self.provider.decode_page(account_id, since, body),
                )
                .inspect_err(|e| {
                    warn!(
                        "[SYNC] {} sync for {} aborted at page {}: {}",
                        source, account_id, page, e
                    )
                })?;
            stats.pages_fetched += 1;

            if feed.item_count == 0 {
                debug!("[SYNC] Page {} empty, feed complete", page);
                break;
            }

            for record in feed.records {
                self.store.upsert_activity(record)?;
                stats.activities_upserted += 1;
            }

            if feed.exhausted {
                debug!("[SYNC] Page {} reaches past the window, feed complete", page);
                break;
            }
            page += 1;
        }

        let watermark = if explicit {
            SyncWatermark::new(account_id.clone(), source, started_at)
        } else {
            SyncWatermark::advanced(previous.as_ref(), account_id.clone(), source, started_at)
        };
        self.store.save_watermark(watermark)?;

        stats.duration_ms = timer.elapsed().as_millis() as u64;
        info!(
            "[SYNC] {} sync for {} complete: {} pages, {} activities in {}ms",
            source, account_id, stats.pages_fetched, stats.activities_upserted, stats.duration_ms
        );
        Ok(stats)
    }

    /// Sync several accounts in parallel; one outcome per distinct account,
    /// in first-seen order
    pub fn sync_accounts(
        &self,
        account_ids: &[AccountId],
        since: Option<DateTime<Utc>>,
    ) -> Vec<(AccountId, Result<SyncStats>)> {
        let mut seen = HashSet::new();
        let distinct: Vec<&AccountId> = account_ids
            .iter()
            .filter(|id| seen.insert((*id).clone()))
            .collect();

        distinct
            .into_par_iter()
            .map(|id| (id.clone(), self.sync_account(id, since)))
            .collect()
    }

    fn begin(&self, account_id: &AccountId) -> Result<InFlight<'_>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !in_flight.insert(account_id.clone()) {
            return Err(Error::SyncInProgress {
                account_id: account_id.clone(),
            });
        }
        Ok(InFlight {
            engine: self,
            account_id: account_id.clone(),
        })
    }
}
