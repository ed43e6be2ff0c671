//! The real HTTP transport against a local mock server

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use httpmock::prelude::*;
use workouts::{
    AccountId, ApiKey, ConditionalFetcher, FetcherConfig, FileCache, HttpTransport, ManualClock,
    UreqTransport,
};

fn transport() -> Arc<UreqTransport> {
    Arc::new(UreqTransport::new(Duration::from_secs(5)))
}

#[test]
fn test_etag_round_trip_through_ureq() {
    let server = MockServer::start();
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::shared(Utc::now());
    let cache = Arc::new(FileCache::with_clock(dir.path().join("strava"), clock.clone()).unwrap());
    let fetcher = ConditionalFetcher::new(
        FetcherConfig::new(server.base_url()),
        transport(),
        Arc::new(ApiKey::new("token")),
    )
    .with_cache(cache);
    let account = AccountId::new("me");

    let mut full = server.mock(|when, then| {
        when.method(GET)
            .path("/athlete/activities")
            .query_param("page", "1")
            .header("Authorization", "Bearer token");
        then.status(200)
            .header("ETag", "\"v1\"")
            .header("Content-Type", "application/json")
            .body("[1,2,3]");
    });

    let first: Vec<u32> = fetcher
        .fetch_json(&account, "/athlete/activities", &[("page", "1")], TimeDelta::hours(1))
        .unwrap();
    assert_eq!(first, vec![1, 2, 3]);
    full.assert_hits(1);
    full.delete();

    let not_modified = server.mock(|when, then| {
        when.method(GET)
            .path("/athlete/activities")
            .header("If-None-Match", "\"v1\"");
        then.status(304);
    });

    clock.advance(TimeDelta::hours(2));
    let second: Vec<u32> = fetcher
        .fetch_json(&account, "/athlete/activities", &[("page", "1")], TimeDelta::hours(1))
        .unwrap();

    assert_eq!(second, first);
    not_modified.assert_hits(1);
}

#[test]
fn test_error_status_is_returned_as_data() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/activities/1");
        then.status(401).body(r#"{"message":"Authorization Error"}"#);
    });

    let response = transport()
        .get(&server.url("/activities/1"), &[("Authorization", "Bearer stale")])
        .unwrap();

    mock.assert();
    assert_eq!(response.status, 401);
    assert!(response.is_unauthorized());
    assert!(response.body_text().contains("Authorization Error"));
}

#[test]
fn test_post_form_sends_urlencoded_body() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/oauth/token")
            .header("Content-Type", "application/x-www-form-urlencoded")
            .x_www_form_urlencoded_tuple("grant_type", "refresh_token")
            .x_www_form_urlencoded_tuple("refresh_token", "r-1");
        then.status(200)
            .body(r#"{"access_token":"a","refresh_token":"r-2","expires_in":3600}"#);
    });

    let response = transport()
        .post_form(
            &server.url("/oauth/token"),
            &[("grant_type", "refresh_token"), ("refresh_token", "r-1")],
        )
        .unwrap();

    mock.assert();
    assert!(response.is_success());
}
