//! Workouts crate - Sync and caching engine for fitness activity APIs
//!
//! This crate provides:
//! - Domain models (ActivityRecord, Credential, SyncWatermark)
//! - OAuth2 token lifecycle for Strava and static API keys for Hevy
//! - A conditional HTTP response cache (freshness window + ETag revalidation)
//! - Provider adapters behind one generic fetcher
//! - An incremental, idempotent sync engine with error classification
//! - SQLite and in-memory persistence sinks
//!
//! Everything is blocking; callers pick their own threading model.

pub mod auth;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod fetch;
pub mod http;
pub mod models;
pub mod providers;
pub mod storage;
pub mod sync;

#[cfg(test)]
mod test_support;

pub use auth::{
    ApiKey, CredentialStore, FileCredentialStore, InMemoryCredentialStore, OAuthClient,
    TokenGrant, TokenManager, TokenSource,
};
pub use cache::{
    Cache, CacheEntry, FileCache, InMemoryCache, key_for, key_for_account, key_for_url,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AppConfig;
pub use error::{Error, GrantFailure, Result, TransportErrorKind};
pub use fetch::{AuthStyle, ConditionalFetcher, FetcherConfig, KeyStrategy};
pub use http::{HttpResponse, HttpTransport, UreqTransport};
pub use models::{AccountId, ActivityKey, ActivityRecord, Credential, Source, SyncWatermark};
pub use providers::{ActivityProvider, FeedPage, Hevy, Strava};
pub use storage::{ActivityStore, InMemoryActivityStore, SqliteActivityStore};
pub use sync::{
    // Sync execution
    SyncEngine, SyncOptions, SyncStats,
    // Failure classification (for the worker's retry decision)
    RetryDisposition, classify, is_retryable,
    // Scheduling helpers
    cooldown_elapsed, sync_window_start,
};
