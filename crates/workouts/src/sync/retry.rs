//! Failure classification for the job scheduler
//!
//! Decides from the error variant alone whether a failed sync should be
//! retried later, dropped for good, or ignored because another run covers it.

use crate::error::Error;

/// What a scheduler should do with a failed job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    /// Transient: try again later
    Retry,
    /// Permanent until something changes (re-authorization, code fix)
    Drop,
    /// Another sync for the same account is already running
    Skip,
}

pub fn classify(err: &Error) -> RetryDisposition {
    match err {
        Error::Transport { kind, .. } if kind.is_transient() => RetryDisposition::Retry,
        Error::Upstream { status, .. } if *status == 429 || (500..600).contains(status) => {
            RetryDisposition::Retry
        }
        Error::RefreshFailed { reason, .. } | Error::AuthorizationFailed { reason, .. }
            if !reason.is_terminal() =>
        {
            RetryDisposition::Retry
        }
        Error::SyncInProgress { .. } => RetryDisposition::Skip,
        _ => RetryDisposition::Drop,
    }
}

pub fn is_retryable(err: &Error) -> bool {
    classify(err) == RetryDisposition::Retry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{GrantFailure, TransportErrorKind};
    use crate::models::AccountId;

    fn upstream(status: u16) -> Error {
        Error::Upstream {
            status,
            body: String::new(),
        }
    }

    fn refresh_failed(reason: GrantFailure) -> Error {
        Error::RefreshFailed {
            account_id: AccountId::new("me"),
            reason,
        }
    }

    fn decode_error() -> Error {
        let source = serde_json::from_str::<Vec<i32>>("{").unwrap_err();
        Error::decode("page", source)
    }

    #[test]
    fn test_transient_network_failures_retry() {
        for kind in [
            TransportErrorKind::Timeout,
            TransportErrorKind::Connection,
            TransportErrorKind::Dns,
        ] {
            let err = Error::Transport {
                kind,
                message: String::new(),
            };
            assert_eq!(classify(&err), RetryDisposition::Retry);
        }
        let other = Error::Transport {
            kind: TransportErrorKind::Other,
            message: String::new(),
        };
        assert_eq!(classify(&other), RetryDisposition::Drop);
    }

    #[test]
    fn test_status_codes() {
        assert!(is_retryable(&upstream(429)));
        assert!(is_retryable(&upstream(500)));
        assert!(is_retryable(&upstream(503)));
        assert!(!is_retryable(&upstream(400)));
        assert!(!is_retryable(&upstream(401)));
        assert!(!is_retryable(&upstream(404)));
    }

    #[test]
    fn test_refresh_failures() {
        assert!(is_retryable(&refresh_failed(GrantFailure::Rejected {
            status: 503,
            body: String::new()
        })));
        assert!(is_retryable(&refresh_failed(GrantFailure::Transport {
            kind: TransportErrorKind::Timeout,
            message: String::new()
        })));
        assert!(!is_retryable(&refresh_failed(GrantFailure::InvalidGrant {
            body: String::new()
        })));
        assert!(!is_retryable(&refresh_failed(
            GrantFailure::MissingRefreshToken
        )));
    }

    #[test]
    fn test_terminal_errors() {
        assert_eq!(
            classify(&Error::NoCredential {
                account_id: AccountId::new("me")
            }),
            RetryDisposition::Drop
        );
        assert_eq!(classify(&decode_error()), RetryDisposition::Drop);
        assert_eq!(
            classify(&Error::Storage(anyhow::anyhow!("disk full"))),
            RetryDisposition::Drop
        );
        assert_eq!(
            classify(&Error::InvalidArgument {
                message: "bad since".to_string()
            }),
            RetryDisposition::Drop
        );
    }

    #[test]
    fn test_in_progress_is_skipped() {
        assert_eq!(
            classify(&Error::SyncInProgress {
                account_id: AccountId::new("me")
            }),
            RetryDisposition::Skip
        );
    }
}
