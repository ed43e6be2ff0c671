//! Conditional fetcher
//!
//! Chooses between a fresh cache hit, an `If-None-Match` revalidation of a
//! stale entry, and an unconditional request. Cache trouble is logged and
//! otherwise ignored: a broken cache makes fetches slower, never failing.
//!
//! ```text
//! fresh hit ──────────────────────────────────────────▶ cached body
//! stale + etag ─▶ GET If-None-Match ─▶ 304 ─▶ bump ───▶ cached body
//!                                    └▶ 2xx ─▶ write ─▶ new body
//!                                    └▶ other ─┐
//! miss / no cache ─────────────────────────────┴▶ GET ─▶ 2xx ─▶ write ─▶ body
//!                                                     └▶ Error::Upstream
//! ```
//!
//! Keys are namespaced by account, so one fetcher can serve many athletes
//! without handing one athlete's cached body to another.

use std::sync::Arc;

use chrono::TimeDelta;
use log::{debug, info, warn};
use serde::de::DeserializeOwned;

use crate::auth::TokenSource;
use crate::cache::{self, Cache, CacheEntry};
use crate::error::{Error, Result};
use crate::http::{HttpResponse, HttpTransport};
use crate::models::AccountId;

/// How the access token is attached to requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStyle {
    /// `Authorization: Bearer <token>`
    Bearer,
    /// `<name>: <token>`
    Header(&'static str),
}

impl AuthStyle {
    fn header(&self, token: &str) -> (&'static str, String) {
        match self {
            AuthStyle::Bearer => ("Authorization", format!("Bearer {}", token)),
            AuthStyle::Header(name) => (*name, token.to_string()),
        }
    }
}

/// How cache keys are derived for a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStrategy {
    /// Request path plus query parameters
    Request,
    /// Full URL including host
    Url,
}

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub base_url: String,
    pub auth: AuthStyle,
    pub key_strategy: KeyStrategy,
    /// Skip cache reads; successful responses are still written
    pub no_cache: bool,
}

impl FetcherConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth: AuthStyle::Bearer,
            key_strategy: KeyStrategy::Request,
            no_cache: false,
        }
    }

    pub fn auth(mut self, auth: AuthStyle) -> Self {
        self.auth = auth;
        self
    }

    pub fn key_strategy(mut self, key_strategy: KeyStrategy) -> Self {
        self.key_strategy = key_strategy;
        self
    }

    pub fn no_cache(mut self, no_cache: bool) -> Self {
        self.no_cache = no_cache;
        self
    }
}

/// Cache-aware GET client for one upstream API
pub struct ConditionalFetcher {
    config: FetcherConfig,
    transport: Arc<dyn HttpTransport>,
    tokens: Arc<dyn TokenSource>,
    cache: Option<Arc<dyn Cache>>,
}

impl ConditionalFetcher {
    pub fn new(
        config: FetcherConfig,
        transport: Arc<dyn HttpTransport>,
        tokens: Arc<dyn TokenSource>,
    ) -> Self {
        Self {
            config,
            transport,
            tokens,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    pub fn tokens(&self) -> &Arc<dyn TokenSource> {
        &self.tokens
    }

    /// Absolute URL for a request
    pub fn url(&self, path: &str, params: &[(&str, &str)]) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        let query = cache::key::canonical_query(params.iter().copied());
        if query.is_empty() {
            format!("{}{}", base, path)
        } else {
            format!("{}{}?{}", base, path, query)
        }
    }

    /// Cache key for an account's request under this fetcher's key strategy
    pub fn cache_key(
        &self,
        account_id: &AccountId,
        path: &str,
        params: &[(&str, &str)],
    ) -> String {
        let request_key = match self.config.key_strategy {
            KeyStrategy::Url => cache::key_for_url(&self.url(path, params)),
            KeyStrategy::Request => match &self.cache {
                Some(cache) => cache.key_for(path, params),
                None => cache::key_for(path, params.iter().copied()),
            },
        };
        cache::key_for_account(account_id.as_str(), &request_key)
    }

    /// Fetch and decode, serving from cache while younger than `ttl`.
    ///
    /// A zero `ttl` means cached entries never go stale.
    pub fn fetch<T>(
        &self,
        account_id: &AccountId,
        path: &str,
        params: &[(&str, &str)],
        ttl: TimeDelta,
        decode: impl Fn(&[u8]) -> Result<T>,
    ) -> Result<T> {
        let url = self.url(path, params);
        let key = self.cache_key(account_id, path, params);

        if let Some(cache) = self.readable_cache() {
            let mut cached_body_is_bad = false;

            match cache.read(&key, ttl) {
                Ok(Some(entry)) => match decode(&entry.body) {
                    Ok(value) => {
                        debug!("[FETCH] Cache hit {}", key);
                        return Ok(value);
                    }
                    Err(e) => {
                        warn!("[CACHE] Ignoring undecodable entry {}: {}", key, e);
                        cached_body_is_bad = true;
                    }
                },
                Ok(None) => {}
                Err(e) => warn!("[CACHE] Read failed for {}: {}", key, Error::cache(e)),
            }

            if !cached_body_is_bad
                && let Some(stale) = self.stale_entry(cache, &key)
                && let Some(value) = self.revalidate(cache, account_id, &url, stale, &decode)?
            {
                return Ok(value);
            }
        }

        self.fetch_unconditional(account_id, &url, &key, &decode)
    }

    /// [`ConditionalFetcher::fetch`] decoding the body as JSON
    pub fn fetch_json<T: DeserializeOwned>(
        &self,
        account_id: &AccountId,
        path: &str,
        params: &[(&str, &str)],
        ttl: TimeDelta,
    ) -> Result<T> {
        self.fetch(account_id, path, params, ttl, |body| {
            serde_json::from_slice(body).map_err(|e| Error::decode(path, e))
        })
    }

    /// Always go to the network and leave the cache untouched.
    ///
    /// Used for feed pages whose window moves on every run: caching them
    /// would only pile up entries nothing reads again.
    pub fn fetch_fresh<T>(
        &self,
        account_id: &AccountId,
        path: &str,
        params: &[(&str, &str)],
        decode: impl Fn(&[u8]) -> Result<T>,
    ) -> Result<T> {
        let url = self.url(path, params);
        let response = self.send_ok(account_id, &url)?;
        decode(&response.body)
    }

    fn readable_cache(&self) -> Option<&Arc<dyn Cache>> {
        if self.config.no_cache {
            None
        } else {
            self.cache.as_ref()
        }
    }

    /// Entry of any age that can be revalidated
    fn stale_entry(&self, cache: &Arc<dyn Cache>, key: &str) -> Option<CacheEntry> {
        match cache.read(key, TimeDelta::zero()) {
            Ok(entry) => entry.filter(|e| e.etag.is_some()),
            Err(e) => {
                warn!("[CACHE] Read failed for {}: {}", key, Error::cache(e));
                None
            }
        }
    }

    /// `Ok(None)` means the conditional request did not settle the fetch
    /// and an unconditional one should follow
    fn revalidate<T>(
        &self,
        cache: &Arc<dyn Cache>,
        account_id: &AccountId,
        url: &str,
        stale: CacheEntry,
        decode: &impl Fn(&[u8]) -> Result<T>,
    ) -> Result<Option<T>> {
        let etag = stale.etag.clone();
        let response = match self.send(account_id, url, etag.as_deref()) {
            Ok(response) => response,
            Err(e @ Error::Transport { .. }) => {
                warn!("[FETCH] Revalidation of {} failed, refetching: {}", url, e);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if response.is_not_modified() {
            let value = match decode(&stale.body) {
                Ok(value) => value,
                Err(e) => {
                    warn!("[CACHE] Revalidated entry {} is undecodable: {}", stale.key, e);
                    return Ok(None);
                }
            };
            debug!("[FETCH] Not modified {}", url);
            let refreshed = CacheEntry::new(stale.key, stale.body).with_etag(response.etag.or(etag));
            self.store(cache, refreshed);
            return Ok(Some(value));
        }

        if response.is_success() {
            return self.accept(&stale.key, response, decode).map(Some);
        }

        info!(
            "[FETCH] Revalidation of {} returned HTTP {}, refetching",
            url, response.status
        );
        Ok(None)
    }

    fn fetch_unconditional<T>(
        &self,
        account_id: &AccountId,
        url: &str,
        key: &str,
        decode: &impl Fn(&[u8]) -> Result<T>,
    ) -> Result<T> {
        let response = self.send_ok(account_id, url)?;
        self.accept(key, response, decode)
    }

    /// Unconditional GET; any non-2xx status becomes [`Error::Upstream`]
    fn send_ok(&self, account_id: &AccountId, url: &str) -> Result<HttpResponse> {
        let response = self.send(account_id, url, None)?;
        if !response.is_success() {
            return Err(Error::Upstream {
                status: response.status,
                body: response.body_text(),
            });
        }
        Ok(response)
    }

    /// Decode a 2xx response and record it in the cache
    fn accept<T>(
        &self,
        key: &str,
        response: HttpResponse,
        decode: &impl Fn(&[u8]) -> Result<T>,
    ) -> Result<T> {
        let value = decode(&response.body)?;
        if let Some(cache) = &self.cache {
            self.store(cache, CacheEntry::new(key, response.body).with_etag(response.etag));
        }
        Ok(value)
    }

    fn store(&self, cache: &Arc<dyn Cache>, entry: CacheEntry) {
        let key = entry.key.clone();
        if let Err(e) = cache.write(entry) {
            warn!("[CACHE] Write failed for {}: {}", key, Error::cache(e));
        }
    }

    /// One GET, plus one retry with a refreshed token after a 401
    fn send(
        &self,
        account_id: &AccountId,
        url: &str,
        if_none_match: Option<&str>,
    ) -> Result<HttpResponse> {
        let token = self.tokens.access_token(account_id)?;
        let response = self.get(url, &token, if_none_match)?;
        if !response.is_unauthorized() {
            return Ok(response);
        }

        match self.tokens.force_refresh(account_id, &token)? {
            Some(fresh) => {
                info!("[FETCH] 401 from {}, retrying with refreshed token", url);
                self.get(url, &fresh, if_none_match)
            }
            None => Ok(response),
        }
    }

    fn get(&self, url: &str, token: &str, if_none_match: Option<&str>) -> Result<HttpResponse> {
        let (auth_name, auth_value) = self.config.auth.header(token);
        let mut headers: Vec<(&str, &str)> = vec![(auth_name, auth_value.as_str())];
        if let Some(etag) = if_none_match {
            headers.push(("If-None-Match", etag));
        }
        self.transport.get(url, &headers)
    }
}
