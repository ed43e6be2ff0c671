//! OAuth2 token material for one account

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::AccountId;

/// Stored OAuth2 credential
///
/// Created by an out-of-band authorization exchange and mutated in place on
/// every refresh. There is exactly one credential per account.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub account_id: AccountId,
    pub access_token: String,
    /// Required for renewal; without it the account must re-authorize
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(
        account_id: AccountId,
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            account_id,
            access_token: access_token.into(),
            refresh_token,
            expires_at,
        }
    }

    /// True when less than `margin` remains before expiry (or already expired)
    pub fn expires_within(&self, now: DateTime<Utc>, margin: TimeDelta) -> bool {
        self.expires_at - now < margin
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("account_id", &self.account_id)
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
