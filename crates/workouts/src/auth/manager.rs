//! Token lifecycle management
//!
//! Keeps an account's access token valid across calls: proactive refresh
//! when the stored token is about to expire, reactive refresh after the
//! upstream rejects a token that looked valid. Refreshes for one account
//! are serialized so concurrent callers share a single token rotation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::TimeDelta;
use log::{debug, info, warn};

use super::oauth::OAuthClient;
use super::store::CredentialStore;
use crate::clock::{self, Clock};
use crate::error::{Error, GrantFailure, Result};
use crate::models::{AccountId, Credential};

/// The fetcher's view of credentials
pub trait TokenSource: Send + Sync {
    /// A token believed to be valid right now
    fn access_token(&self, account_id: &AccountId) -> Result<String>;

    /// Called after the upstream rejected `rejected_token` with 401.
    ///
    /// Returns the token to retry with, or `None` when this source cannot
    /// produce a different one (the 401 is then final).
    fn force_refresh(&self, account_id: &AccountId, rejected_token: &str)
    -> Result<Option<String>>;
}

/// Static API key (Hevy)
///
/// The key belongs to a single Hevy user and is sent unchanged for every
/// account, so one `ApiKey` should only ever back one account.
pub struct ApiKey {
    key: String,
}

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl TokenSource for ApiKey {
    fn access_token(&self, account_id: &AccountId) -> Result<String> {
        if self.key.is_empty() {
            return Err(Error::NoCredential {
                account_id: account_id.clone(),
            });
        }
        Ok(self.key.clone())
    }

    fn force_refresh(&self, _: &AccountId, _: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

/// OAuth2 token lifecycle manager
pub struct TokenManager {
    store: Arc<dyn CredentialStore>,
    oauth: OAuthClient,
    clock: Arc<dyn Clock>,
    refresh_margin: TimeDelta,
    locks: Mutex<HashMap<AccountId, Arc<Mutex<()>>>>,
}

impl TokenManager {
    /// Refresh tokens with less than this much lifetime left
    pub const DEFAULT_REFRESH_MARGIN: TimeDelta = TimeDelta::minutes(2);

    pub fn new(store: Arc<dyn CredentialStore>, oauth: OAuthClient) -> Self {
        Self {
            store,
            oauth,
            clock: clock::system(),
            refresh_margin: Self::DEFAULT_REFRESH_MARGIN,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_refresh_margin(mut self, margin: TimeDelta) -> Self {
        self.refresh_margin = margin;
        self
    }

    /// Return a currently valid access token, refreshing first if the stored
    /// one expires within the refresh margin
    pub fn get_valid_token(&self, account_id: &AccountId) -> Result<String> {
        let credential = self.load(account_id)?;
        if !self.needs_refresh(&credential) {
            return Ok(credential.access_token);
        }

        let lock = self.account_lock(account_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        // Another caller may have refreshed while we waited
        let credential = self.load(account_id)?;
        if !self.needs_refresh(&credential) {
            debug!("[AUTH] Reusing token refreshed concurrently for {}", account_id);
            return Ok(credential.access_token);
        }

        self.refresh_locked(credential)
    }

    /// Force one refresh after `rejected_token` was refused upstream
    ///
    /// If the stored token already differs from the rejected one, another
    /// caller rotated it and the stored token is returned without a refresh.
    pub fn force_refresh(&self, account_id: &AccountId, rejected_token: &str) -> Result<String> {
        let lock = self.account_lock(account_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let credential = self.load(account_id)?;
        if credential.access_token != rejected_token {
            debug!("[AUTH] Token for {} already rotated", account_id);
            return Ok(credential.access_token);
        }

        info!("[AUTH] Token for {} rejected upstream, refreshing", account_id);
        self.refresh_locked(credential)
    }

    /// Exchange an out-of-band authorization code and store the credential
    pub fn authorize(
        &self,
        account_id: &AccountId,
        code: &str,
        redirect_uri: Option<&str>,
    ) -> Result<Credential> {
        let lock = self.account_lock(account_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let grant = self
            .oauth
            .exchange_code(code, redirect_uri)
            .map_err(|reason| Error::AuthorizationFailed {
                account_id: account_id.clone(),
                reason,
            })?;
        let credential = grant.into_credential(account_id.clone(), None);
        self.store.save(&credential)?;

        info!(
            "[AUTH] Authorized account {} (expires {})",
            account_id, credential.expires_at
        );
        Ok(credential)
    }

    /// Forget the stored credential
    pub fn logout(&self, account_id: &AccountId) -> Result<()> {
        self.store.delete(account_id)?;
        info!("[AUTH] Removed credential for {}", account_id);
        Ok(())
    }

    pub fn is_authorized(&self, account_id: &AccountId) -> Result<bool> {
        Ok(self.store.load(account_id)?.is_some())
    }

    fn needs_refresh(&self, credential: &Credential) -> bool {
        credential.expires_within(self.clock.now(), self.refresh_margin)
    }

    fn load(&self, account_id: &AccountId) -> Result<Credential> {
        self.store
            .load(account_id)?
            .ok_or_else(|| Error::NoCredential {
                account_id: account_id.clone(),
            })
    }

    /// Must be called with the account lock held
    fn refresh_locked(&self, credential: Credential) -> Result<String> {
        let account_id = credential.account_id.clone();
        let refresh_token = match credential.refresh_token {
            Some(ref token) if !token.is_empty() => token.clone(),
            _ => {
                warn!("[AUTH] No refresh token for {}", account_id);
                return Err(Error::RefreshFailed {
                    account_id,
                    reason: GrantFailure::MissingRefreshToken,
                });
            }
        };

        let grant = self.oauth.refresh(&refresh_token).map_err(|reason| {
            warn!("[AUTH] Refresh failed for {}: {}", account_id, reason);
            Error::RefreshFailed {
                account_id: account_id.clone(),
                reason,
            }
        })?;

        let refreshed = grant.into_credential(account_id.clone(), Some(refresh_token));
        self.store.save(&refreshed)?;
        info!(
            "[AUTH] Refreshed token for {} (expires {})",
            account_id, refreshed.expires_at
        );
        Ok(refreshed.access_token)
    }

    fn account_lock(&self, account_id: &AccountId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(account_id.clone()).or_default().clone()
    }
}

impl TokenSource for TokenManager {
    fn access_token(&self, account_id: &AccountId) -> Result<String> {
        self.get_valid_token(account_id)
    }

    fn force_refresh(&self, account_id: &AccountId, rejected_token: &str) -> Result<Option<String>> {
        TokenManager::force_refresh(self, account_id, rejected_token).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::InMemoryCredentialStore;
    use crate::clock::ManualClock;
    use crate::http::HttpResponse;
    use crate::test_support::MockTransport;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixture {
        manager: TokenManager,
        store: Arc<InMemoryCredentialStore>,
        transport: Arc<MockTransport>,
        clock: Arc<ManualClock>,
    }

    fn account() -> AccountId {
        AccountId::new("me")
    }

    /// Token endpoint that hands out access-1, access-2, ... valid for 6h
    fn fixture(expires_in_secs: i64) -> Fixture {
        let clock = ManualClock::shared(Utc.with_ymd_and_hms(2026, 4, 10, 7, 30, 0).unwrap());
        let issued = Arc::new(AtomicUsize::new(0));
        let transport = MockTransport::new(move |_| {
            let n = issued.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(HttpResponse::new(
                200,
                format!(
                    r#"{{"access_token":"access-{}","refresh_token":"refresh-{}","expires_in":21600}}"#,
                    n, n
                ),
            ))
        });
        let store = Arc::new(InMemoryCredentialStore::with([Credential::new(
            account(),
            "access-0",
            Some("refresh-0".to_string()),
            clock.now() + TimeDelta::seconds(expires_in_secs),
        )]));
        let oauth = OAuthClient::new("cid", "secret", transport.clone()).with_clock(clock.clone());
        let manager = TokenManager::new(store.clone(), oauth).with_clock(clock.clone());
        Fixture {
            manager,
            store,
            transport,
            clock,
        }
    }

    #[test]
    fn test_valid_token_needs_no_network() {
        let f = fixture(3600);
        assert_eq!(f.manager.get_valid_token(&account()).unwrap(), "access-0");
        assert_eq!(f.transport.count(), 0);
    }

    #[test]
    fn test_token_expiring_within_margin_is_refreshed_once() {
        let f = fixture(60);

        let token = f.manager.get_valid_token(&account()).unwrap();
        assert_eq!(token, "access-1");
        assert_eq!(f.transport.count(), 1);

        let stored = f.store.load(&account()).unwrap().unwrap();
        assert_eq!(stored.access_token, "access-1");
        assert_eq!(stored.refresh_token.as_deref(), Some("refresh-1"));
        assert_eq!(stored.expires_at, f.clock.now() + TimeDelta::hours(6));

        // Second call is served from the stored credential
        assert_eq!(f.manager.get_valid_token(&account()).unwrap(), "access-1");
        assert_eq!(f.transport.count(), 1);
    }

    #[test]
    fn test_missing_credential() {
        let f = fixture(3600);
        let err = f
            .manager
            .get_valid_token(&AccountId::new("stranger"))
            .unwrap_err();
        assert!(matches!(err, Error::NoCredential { .. }));
    }

    #[test]
    fn test_missing_refresh_token_is_terminal() {
        let f = fixture(3600);
        f.store
            .save(&Credential::new(
                account(),
                "access-0",
                None,
                f.clock.now() - TimeDelta::minutes(1),
            ))
            .unwrap();

        let err = f.manager.get_valid_token(&account()).unwrap_err();
        match err {
            Error::RefreshFailed { reason, .. } => {
                assert_eq!(reason, GrantFailure::MissingRefreshToken)
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(f.transport.count(), 0);
    }

    #[test]
    fn test_failed_refresh_leaves_credential_untouched() {
        let clock = ManualClock::shared(Utc::now());
        let transport = MockTransport::new(|_| Ok(HttpResponse::new(503, "maintenance")));
        let original = Credential::new(
            account(),
            "access-0",
            Some("refresh-0".to_string()),
            clock.now(),
        );
        let store = Arc::new(InMemoryCredentialStore::with([original.clone()]));
        let oauth = OAuthClient::new("cid", "secret", transport).with_clock(clock.clone());
        let manager = TokenManager::new(store.clone(), oauth).with_clock(clock);

        let err = manager.get_valid_token(&account()).unwrap_err();
        assert!(matches!(err, Error::RefreshFailed { .. }));
        assert_eq!(store.load(&account()).unwrap(), Some(original));
    }

    #[test]
    fn test_force_refresh_rotates_rejected_token() {
        let f = fixture(3600);
        let token = f.manager.force_refresh(&account(), "access-0").unwrap();
        assert_eq!(token, "access-1");
        assert_eq!(f.transport.count(), 1);
    }

    #[test]
    fn test_force_refresh_skips_when_already_rotated() {
        let f = fixture(3600);
        f.manager.force_refresh(&account(), "access-0").unwrap();

        // A second caller still holding the old token gets the new one
        let token = f.manager.force_refresh(&account(), "access-0").unwrap();
        assert_eq!(token, "access-1");
        assert_eq!(f.transport.count(), 1);
    }

    #[test]
    fn test_concurrent_callers_share_one_refresh() {
        let f = Arc::new(fixture(30));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let f = f.clone();
                std::thread::spawn(move || f.manager.get_valid_token(&account()).unwrap())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), "access-1");
        }
        assert_eq!(f.transport.count(), 1);
    }

    #[test]
    fn test_authorize_and_logout() {
        let f = fixture(3600);
        let other = AccountId::new("athlete-7");

        let credential = f.manager.authorize(&other, "code", None).unwrap();
        assert_eq!(credential.access_token, "access-1");
        assert!(f.manager.is_authorized(&other).unwrap());
        assert_eq!(f.manager.get_valid_token(&other).unwrap(), "access-1");

        f.manager.logout(&other).unwrap();
        assert!(!f.manager.is_authorized(&other).unwrap());
    }

    #[test]
    fn test_api_key_source() {
        let key = ApiKey::new("hevy-key");
        assert_eq!(key.access_token(&account()).unwrap(), "hevy-key");
        assert_eq!(key.force_refresh(&account(), "hevy-key").unwrap(), None);
        assert!(matches!(
            ApiKey::new("").access_token(&account()),
            Err(Error::NoCredential { .. })
        ));
    }
}
