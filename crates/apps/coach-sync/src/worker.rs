//! Engine assembly and job outcome handling
//!
//! Builds one [`SyncEngine`] per run from the loaded configuration, decides
//! which accounts are due, and folds per-account outcomes into a process
//! exit code a scheduler can act on.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use log::{info, warn};
use workouts::{
    AccountId, ActivityProvider, ActivityStore, ApiKey, AppConfig, ConditionalFetcher, FileCache,
    Hevy, HttpTransport, OAuthClient, RetryDisposition, Source, SqliteActivityStore, Strava,
    SyncEngine, SyncStats, TokenManager, TokenSource, UreqTransport, classify, cooldown_elapsed,
};

/// Every account synced (or was skipped)
pub const EXIT_OK: i32 = 0;
/// At least one failure is worth retrying (EX_TEMPFAIL)
pub const EXIT_RETRY: i32 = 75;
/// Failures that need a human
pub const EXIT_FAILURE: i32 = 1;

/// Strava token lifecycle backed by the SQLite credential table
pub fn token_manager(
    cfg: &AppConfig,
    store: Arc<SqliteActivityStore>,
    transport: Arc<dyn HttpTransport>,
) -> Result<TokenManager> {
    if !cfg.strava.has_client_credentials() {
        bail!("Strava client credentials missing: set STRAVA_CLIENT_ID and STRAVA_CLIENT_SECRET");
    }
    let oauth = OAuthClient::new(
        cfg.strava.client_id.as_str(),
        cfg.strava.client_secret.as_str(),
        transport,
    )
    .with_token_url(cfg.strava.token_url.as_str());
    Ok(TokenManager::new(store, oauth).with_refresh_margin(cfg.refresh_margin()))
}

/// Wire provider, token source, cache and store into an engine for `source`
pub fn build_engine(
    cfg: &AppConfig,
    source: Source,
    store: Arc<SqliteActivityStore>,
) -> Result<SyncEngine> {
    let transport: Arc<dyn HttpTransport> = Arc::new(UreqTransport::new(cfg.http_timeout()));

    let (provider, tokens): (Arc<dyn ActivityProvider>, Arc<dyn TokenSource>) = match source {
        Source::Strava => {
            let provider = Strava::with_base_url(cfg.strava.api_base.as_str())
                .with_detail_ttl(cfg.detail_ttl());
            let tokens = token_manager(cfg, store.clone(), transport.clone())?;
            (Arc::new(provider), Arc::new(tokens))
        }
        Source::Hevy => {
            if cfg.hevy.api_key.is_empty() {
                bail!("Hevy API key missing: set HEVY_API_KEY");
            }
            let provider =
                Hevy::with_base_url(cfg.hevy.api_base.as_str()).with_detail_ttl(cfg.detail_ttl());
            (
                Arc::new(provider),
                Arc::new(ApiKey::new(cfg.hevy.api_key.as_str())),
            )
        }
    };

    let fetcher_config = provider.fetcher_config().no_cache(cfg.cache.no_cache);
    let mut fetcher = ConditionalFetcher::new(fetcher_config, transport, tokens);
    if let Some(dir) = cfg.cache_dir(source) {
        let cache = FileCache::new(&dir)
            .with_context(|| format!("Failed to open cache at {}", dir.display()))?;
        fetcher = fetcher.with_cache(Arc::new(cache));
    }

    Ok(SyncEngine::new(provider, fetcher, store).with_options(cfg.sync_options()))
}

/// Refuse account sets the source cannot tell apart.
///
/// The Hevy API key identifies one Hevy user, so syncing it under several
/// account ids would file the same workouts for each of them.
pub fn check_accounts(source: Source, accounts: &[AccountId]) -> Result<()> {
    if source == Source::Hevy {
        let distinct: HashSet<&AccountId> = accounts.iter().collect();
        if distinct.len() > 1 {
            bail!(
                "Hevy syncs one account per API key, got {} accounts",
                distinct.len()
            );
        }
    }
    Ok(())
}

/// Accounts whose last sync is older than the cooldown
pub fn due_accounts(
    store: &dyn ActivityStore,
    accounts: &[AccountId],
    source: Source,
    now: DateTime<Utc>,
    cooldown_secs: u64,
) -> Result<Vec<AccountId>> {
    let mut due = Vec::with_capacity(accounts.len());
    for account in accounts {
        let last = store
            .get_watermark(account, source)?
            .map(|w| w.last_synced_at);
        if cooldown_elapsed(last, now, cooldown_secs) {
            due.push(account.clone());
        } else {
            info!("{} synced recently, skipping (use --force to override)", account);
        }
    }
    Ok(due)
}

/// Log each outcome and pick the exit code for the whole run
pub fn exit_code(outcomes: &[(AccountId, workouts::Result<SyncStats>)]) -> i32 {
    let mut code = EXIT_OK;
    for (account, outcome) in outcomes {
        match outcome {
            Ok(stats) => info!(
                "{}: {} activities from {} pages in {}ms",
                account, stats.activities_upserted, stats.pages_fetched, stats.duration_ms
            ),
            Err(e) => match classify(e) {
                RetryDisposition::Skip => info!("{}: {}", account, e),
                RetryDisposition::Retry => {
                    warn!("{}: {} (will retry)", account, e);
                    code = EXIT_RETRY;
                }
                RetryDisposition::Drop => {
                    warn!("{}: {}", account, e);
                    if code == EXIT_OK {
                        code = EXIT_FAILURE;
                    }
                }
            },
        }
    }
    code
}
