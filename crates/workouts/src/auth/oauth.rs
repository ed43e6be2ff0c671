//! OAuth2 token endpoint client
//!
//! Speaks the refresh-token and authorization-code grants against a
//! Strava-compatible token endpoint. Failures are returned as
//! [`GrantFailure`] so the caller can attach the account and decide
//! whether re-authorization is needed.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;

use crate::clock::{self, Clock};
use crate::error::{Error, GrantFailure, TransportErrorKind};
use crate::http::{HttpResponse, HttpTransport};
use crate::models::{AccountId, Credential};

/// Token material handed out by the endpoint
#[derive(Clone, PartialEq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl TokenGrant {
    /// Credential for `account_id`, keeping `previous_refresh` when the
    /// endpoint did not rotate the refresh token
    pub fn into_credential(
        self,
        account_id: AccountId,
        previous_refresh: Option<String>,
    ) -> Credential {
        Credential::new(
            account_id,
            self.access_token,
            self.refresh_token.or(previous_refresh),
            self.expires_at,
        )
    }
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("expires_at", &self.expires_at)
            .field("rotated_refresh", &self.refresh_token.is_some())
            .finish()
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    /// Absolute expiry in unix seconds (Strava)
    #[serde(default)]
    expires_at: Option<i64>,
    /// Relative expiry in seconds (RFC 6749)
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Client credentials plus the endpoint they are valid for
pub struct OAuthClient {
    client_id: String,
    client_secret: String,
    token_url: String,
    transport: Arc<dyn HttpTransport>,
    clock: Arc<dyn Clock>,
}

impl OAuthClient {
    pub const STRAVA_TOKEN_URL: &'static str = "https://www.strava.com/oauth/token";

    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_url: Self::STRAVA_TOKEN_URL.to_string(),
            transport,
            clock: clock::system(),
        }
    }

    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Exchange a refresh token for a new access token
    pub fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, GrantFailure> {
        if refresh_token.is_empty() {
            return Err(GrantFailure::MissingRefreshToken);
        }
        self.request(&[
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
    }

    /// Exchange an authorization code obtained out of band
    pub fn exchange_code(
        &self,
        code: &str,
        redirect_uri: Option<&str>,
    ) -> Result<TokenGrant, GrantFailure> {
        let mut form = vec![
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
        ];
        if let Some(uri) = redirect_uri {
            form.push(("redirect_uri", uri));
        }
        self.request(&form)
    }

    fn request(&self, form: &[(&str, &str)]) -> Result<TokenGrant, GrantFailure> {
        let response = self
            .transport
            .post_form(&self.token_url, form)
            .map_err(|err| match err {
                Error::Transport { kind, message } => GrantFailure::Transport { kind, message },
                other => GrantFailure::Transport {
                    kind: TransportErrorKind::Other,
                    message: other.to_string(),
                },
            })?;

        if !response.is_success() {
            return Err(rejection(&response));
        }

        let token: TokenResponse = serde_json::from_slice(&response.body).map_err(|e| {
            GrantFailure::MalformedResponse {
                message: e.to_string(),
            }
        })?;
        if token.access_token.is_empty() {
            return Err(GrantFailure::MalformedResponse {
                message: "empty access_token".to_string(),
            });
        }

        let expires_at = self.expiry(&token)?;
        Ok(TokenGrant {
            access_token: token.access_token,
            refresh_token: token.refresh_token.filter(|t| !t.is_empty()),
            expires_at,
        })
    }

    /// Absolute expiry if given, else now + relative; neither means the
    /// token must be treated as already expiring
    fn expiry(&self, token: &TokenResponse) -> Result<DateTime<Utc>, GrantFailure> {
        let now = self.clock.now();
        if let Some(at) = token.expires_at.and_then(|secs| DateTime::from_timestamp(secs, 0)) {
            return Ok(at);
        }
        let Some(secs) = token.expires_in else {
            return Ok(now);
        };
        TimeDelta::try_seconds(secs)
            .and_then(|delta| now.checked_add_signed(delta))
            .ok_or_else(|| GrantFailure::MalformedResponse {
                message: format!("expires_in out of range: {}", secs),
            })
    }
}

fn rejection(response: &HttpResponse) -> GrantFailure {
    let body = response.body_text();
    if is_invalid_grant(response.status, &response.body) {
        GrantFailure::InvalidGrant { body }
    } else {
        GrantFailure::Rejected {
            status: response.status,
            body,
        }
    }
}

/// An explicit rejection of the grant itself (revoked, expired, reused)
///
/// RFC 6749 servers answer `{"error": "invalid_grant"}`; Strava answers
/// `{"errors": [{"field": "refresh_token", "code": "invalid"}]}`.
fn is_invalid_grant(status: u16, body: &[u8]) -> bool {
    if status != 400 && status != 401 {
        return false;
    }
    let Ok(json) = serde_json::from_slice::<serde_json::Value>(body) else {
        return false;
    };
    if json.get("error").and_then(|e| e.as_str()) == Some("invalid_grant") {
        return true;
    }
    json.get("errors")
        .and_then(|e| e.as_array())
        .is_some_and(|errors| {
            errors
                .iter()
                .any(|e| e.get("code").and_then(|c| c.as_str()) == Some("invalid"))
        })
}
