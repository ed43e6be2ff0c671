//! End-to-end sync runs against a scripted upstream

mod common;

use std::sync::Arc;

use chrono::TimeDelta;
use common::{Recorder, query_param, start, strava_page};
use workouts::{
    AccountId, ActivityProvider, ActivityStore, ApiKey, ConditionalFetcher, Credential,
    CredentialStore, Error, FileCache, HttpResponse, InMemoryActivityStore, InMemoryCache,
    InMemoryCredentialStore, ManualClock, OAuthClient, RetryDisposition, Source,
    SqliteActivityStore, Strava, SyncEngine, TokenManager, classify,
};

const BASE: &str = "https://strava.test/api/v3";

fn strava_engine(
    transport: Arc<Recorder>,
    store: Arc<dyn ActivityStore>,
    clock: Arc<ManualClock>,
) -> SyncEngine {
    let provider = Arc::new(Strava::with_base_url(BASE));
    let fetcher = ConditionalFetcher::new(
        provider.fetcher_config(),
        transport,
        Arc::new(ApiKey::new("token")),
    )
    .with_cache(Arc::new(InMemoryCache::with_clock(clock.clone())));
    SyncEngine::new(provider, fetcher, store).with_clock(clock)
}

/// 50 / 50 / 10 items, then an empty page
fn three_pages(request: &common::Request) -> workouts::Result<HttpResponse> {
    let body = match query_param(&request.url, "page") {
        Some("1") => strava_page(0..50),
        Some("2") => strava_page(50..100),
        Some("3") => strava_page(100..110),
        _ => "[]".to_string(),
    };
    Ok(HttpResponse::new(200, body))
}

#[test]
fn test_three_pages_upsert_everything_and_set_watermark() {
    let transport = Recorder::new(three_pages);
    let store = Arc::new(InMemoryActivityStore::new());
    let clock = ManualClock::shared(start());
    let engine = strava_engine(transport.clone(), store.clone(), clock);
    let account = AccountId::new("athlete-1");

    let stats = engine.sync_account(&account, None).unwrap();

    assert_eq!(stats.activities_upserted, 110);
    assert_eq!(stats.pages_fetched, 4);
    assert_eq!(store.count_activities(&account).unwrap(), 110);
    let watermark = store
        .get_watermark(&account, Source::Strava)
        .unwrap()
        .unwrap();
    assert_eq!(watermark.last_synced_at, start());
    assert_eq!(transport.gets(), 4);
}

#[test]
fn test_repeated_sync_without_new_data_changes_nothing() {
    let transport = Recorder::new(three_pages);
    let store = Arc::new(InMemoryActivityStore::new());
    let clock = ManualClock::shared(start());
    let engine = strava_engine(transport, store.clone(), clock.clone());
    let account = AccountId::new("athlete-1");

    let snapshot = || {
        let mut records = store
            .list_activities(&account, Some(Source::Strava), 500, 0)
            .unwrap();
        records.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        records
    };

    engine.sync_account(&account, None).unwrap();
    let before = snapshot();

    clock.advance(TimeDelta::hours(1));
    engine.sync_account(&account, None).unwrap();
    let after = snapshot();

    assert_eq!(before.len(), 110);
    assert_eq!(before, after);
}

#[test]
fn test_feed_pages_bypass_fresh_cache_entries() {
    let transport = Recorder::new(three_pages);
    let store = Arc::new(InMemoryActivityStore::new());
    let clock = ManualClock::shared(start());
    let engine = strava_engine(transport.clone(), store, clock);
    let account = AccountId::new("athlete-1");

    let since = start() - TimeDelta::days(1);
    engine.sync_account(&account, Some(since)).unwrap();
    engine.sync_account(&account, Some(since)).unwrap();

    assert_eq!(transport.gets(), 8);
}

#[test]
fn test_repeated_syncs_do_not_grow_the_response_cache() {
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::shared(start());
    let transport = Recorder::new(|request| match query_param(&request.url, "page") {
        Some("1") => Ok(HttpResponse::new(200, strava_page(0..3)).with_etag("\"feed\"")),
        _ => Ok(HttpResponse::new(200, "[]")),
    });
    let provider = Arc::new(Strava::with_base_url(BASE));
    let cache = Arc::new(FileCache::with_clock(dir.path().join("strava"), clock.clone()).unwrap());
    let fetcher = ConditionalFetcher::new(
        provider.fetcher_config(),
        transport.clone(),
        Arc::new(ApiKey::new("token")),
    )
    .with_cache(cache.clone());
    let store = Arc::new(InMemoryActivityStore::new());
    let engine = SyncEngine::new(provider, fetcher, store.clone()).with_clock(clock.clone());
    let account = AccountId::new("athlete-1");

    for _ in 0..5 {
        engine.sync_account(&account, None).unwrap();
        clock.advance(TimeDelta::hours(1));
    }

    let cached_files = std::fs::read_dir(cache.root()).unwrap().count();
    assert_eq!(cached_files, 0);
    assert_eq!(transport.gets(), 10);
    assert_eq!(store.count_activities(&account).unwrap(), 3);
}

#[test]
fn test_server_error_mid_feed_keeps_watermark_and_is_retryable() {
    let transport = Recorder::new(|request| match query_param(&request.url, "page") {
        Some("1") => Ok(HttpResponse::new(200, strava_page(0..50))),
        _ => Ok(HttpResponse::new(500, "upstream exploded")),
    });
    let store = Arc::new(InMemoryActivityStore::new());
    let clock = ManualClock::shared(start());
    let engine = strava_engine(transport, store.clone(), clock);
    let account = AccountId::new("athlete-1");

    let err = engine.sync_account(&account, None).unwrap_err();

    assert!(matches!(err, Error::Upstream { status: 500, .. }));
    assert_eq!(classify(&err), RetryDisposition::Retry);
    assert_eq!(store.count_activities(&account).unwrap(), 50);
    assert!(store.get_watermark(&account, Source::Strava).unwrap().is_none());
}

#[test]
fn test_unauthorized_mid_feed_refreshes_once_and_retries_page() {
    let token_url = "https://strava.test/oauth/token";
    let far = start() + TimeDelta::hours(6);
    let grant = format!(
        r#"{{"access_token":"tok-2","refresh_token":"r-2","expires_at":{}}}"#,
        far.timestamp()
    );

    let transport = Recorder::new(move |request| {
        if !request.is_get() {
            return Ok(HttpResponse::new(200, grant.clone()));
        }
        let page = query_param(&request.url, "page");
        let token = request.header("Authorization");
        match (page, token) {
            (Some("2"), Some("Bearer tok-1")) => Ok(HttpResponse::new(401, "expired")),
            (Some("1"), _) => Ok(HttpResponse::new(200, strava_page(0..50))),
            (Some("2"), _) => Ok(HttpResponse::new(200, strava_page(50..60))),
            _ => Ok(HttpResponse::new(200, "[]")),
        }
    });

    let clock = ManualClock::shared(start());
    let account = AccountId::new("athlete-1");
    let credentials = Arc::new(InMemoryCredentialStore::with([Credential::new(
        account.clone(),
        "tok-1",
        Some("r-1".to_string()),
        far,
    )]));
    let oauth = OAuthClient::new("client", "secret", transport.clone())
        .with_token_url(token_url)
        .with_clock(clock.clone());
    let tokens = Arc::new(TokenManager::new(credentials.clone(), oauth).with_clock(clock.clone()));

    let provider = Arc::new(Strava::with_base_url(BASE));
    let fetcher = ConditionalFetcher::new(provider.fetcher_config(), transport.clone(), tokens);
    let store = Arc::new(InMemoryActivityStore::new());
    let engine = SyncEngine::new(provider, fetcher, store.clone()).with_clock(clock);

    let stats = engine.sync_account(&account, None).unwrap();

    assert_eq!(stats.activities_upserted, 60);
    assert_eq!(transport.posts(), 1);
    let page_two: Vec<_> = transport
        .requests()
        .into_iter()
        .filter(|r| r.is_get() && query_param(&r.url, "page") == Some("2"))
        .collect();
    assert_eq!(page_two.len(), 2);
    assert_eq!(page_two[1].header("Authorization"), Some("Bearer tok-2"));

    let stored = credentials.load(&account).unwrap().unwrap();
    assert_eq!(stored.access_token, "tok-2");
    assert_eq!(stored.refresh_token.as_deref(), Some("r-2"));
}

#[test]
fn test_missing_credential_is_terminal_and_fetches_nothing() {
    let transport = Recorder::new(three_pages);
    let clock = ManualClock::shared(start());
    let oauth = OAuthClient::new("client", "secret", transport.clone());
    let tokens = Arc::new(TokenManager::new(
        Arc::new(InMemoryCredentialStore::new()),
        oauth,
    ));
    let provider = Arc::new(Strava::with_base_url(BASE));
    let fetcher = ConditionalFetcher::new(provider.fetcher_config(), transport.clone(), tokens);
    let engine = SyncEngine::new(provider, fetcher, Arc::new(InMemoryActivityStore::new()))
        .with_clock(clock);

    let err = engine
        .sync_account(&AccountId::new("nobody"), None)
        .unwrap_err();

    assert!(matches!(err, Error::NoCredential { .. }));
    assert_eq!(classify(&err), RetryDisposition::Drop);
    assert_eq!(transport.requests().len(), 0);
}

#[test]
fn test_sync_into_sqlite_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("workouts.test.sqlite");
    let account = AccountId::new("athlete-1");

    {
        let store = Arc::new(SqliteActivityStore::new(&db_path).unwrap());
        let engine = strava_engine(
            Recorder::new(three_pages),
            store,
            ManualClock::shared(start()),
        );
        engine.sync_account(&account, None).unwrap();
    }

    let reopened = SqliteActivityStore::new(&db_path).unwrap();
    assert_eq!(reopened.count_activities(&account).unwrap(), 110);
    let newest = reopened
        .list_activities(&account, Some(Source::Strava), 1, 0)
        .unwrap();
    assert_eq!(newest[0].sport, "Run");
    assert_eq!(newest[0].raw_payload["distance"], 5000.0);
    assert_eq!(
        reopened
            .get_watermark(&account, Source::Strava)
            .unwrap()
            .unwrap()
            .last_synced_at,
        start()
    );
}
