//! Error taxonomy for the sync and caching engine
//!
//! Every failure that can leave the engine is one of these variants, which
//! lets the scheduler decide between retrying and dropping a job without
//! inspecting message strings (see [`crate::sync::retry`]).

use std::fmt;

use crate::models::AccountId;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("No credential stored for account {account_id}; authorization required")]
    NoCredential { account_id: AccountId },

    #[error("Token refresh failed for account {account_id}: {reason}")]
    RefreshFailed {
        account_id: AccountId,
        reason: GrantFailure,
    },

    #[error("Authorization code exchange failed for account {account_id}: {reason}")]
    AuthorizationFailed {
        account_id: AccountId,
        reason: GrantFailure,
    },

    #[error("Cache unavailable: {message}")]
    CacheUnavailable { message: String },

    #[error("Upstream returned HTTP {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Transport error ({kind}): {message}")]
    Transport {
        kind: TransportErrorKind,
        message: String,
    },

    #[error("Failed to decode {context}: {source}")]
    Decode {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Sync already running for account {account_id}")]
    SyncInProgress { account_id: AccountId },

    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl Error {
    pub(crate) fn decode(context: impl Into<String>, source: serde_json::Error) -> Self {
        Error::Decode {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn cache(err: impl fmt::Display) -> Self {
        Error::CacheUnavailable {
            message: err.to_string(),
        }
    }

    /// HTTP status carried by an upstream rejection, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Upstream { status, .. } => Some(*status),
            Error::RefreshFailed { reason, .. } | Error::AuthorizationFailed { reason, .. } => {
                match reason {
                    GrantFailure::Rejected { status, .. } => Some(*status),
                    GrantFailure::InvalidGrant { .. } => Some(400),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

/// Coarse classification of a failed network exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Connection,
    Dns,
    Other,
}

impl TransportErrorKind {
    pub fn is_transient(&self) -> bool {
        !matches!(self, TransportErrorKind::Other)
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Connection => "connection",
            TransportErrorKind::Dns => "dns",
            TransportErrorKind::Other => "other",
        })
    }
}

/// Why the token endpoint did not hand out a token
#[derive(Debug, Clone, PartialEq)]
pub enum GrantFailure {
    /// The stored credential has no refresh token
    MissingRefreshToken,
    /// The grant was explicitly rejected (revoked, expired or already used)
    InvalidGrant { body: String },
    /// Any other non-success status from the token endpoint
    Rejected { status: u16, body: String },
    Transport {
        kind: TransportErrorKind,
        message: String,
    },
    /// The endpoint answered 2xx with a body we could not understand
    MalformedResponse { message: String },
}

impl GrantFailure {
    /// Terminal failures need a human to re-authorize
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GrantFailure::MissingRefreshToken | GrantFailure::InvalidGrant { .. }
        )
    }
}

impl fmt::Display for GrantFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrantFailure::MissingRefreshToken => f.write_str("no refresh token available"),
            GrantFailure::InvalidGrant { body } => write!(f, "invalid_grant: {}", body),
            GrantFailure::Rejected { status, body } => {
                write!(f, "token endpoint status {}: {}", status, body)
            }
            GrantFailure::Transport { kind, message } => {
                write!(f, "transport error ({}): {}", kind, message)
            }
            GrantFailure::MalformedResponse { message } => {
                write!(f, "malformed token response: {}", message)
            }
        }
    }
}
