//! Command-line interface

use std::str::FromStr;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use workouts::Source;

#[derive(Debug, Parser)]
#[command(name = "coach-sync")]
#[command(about = "Sync workouts from Strava and Hevy into the local store", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Pull new activities for one or more accounts
    Sync {
        /// Upstream platform
        #[arg(long, default_value = "strava", value_parser = parse_source)]
        source: Source,

        /// Start of the window (RFC 3339 or unix seconds); defaults to the
        /// stored watermark minus the overlap
        #[arg(long, value_parser = parse_since)]
        since: Option<DateTime<Utc>>,

        /// Sync even if the account synced within the cooldown
        #[arg(long)]
        force: bool,

        /// Account identifiers (Hevy takes exactly one: its API key is a
        /// single user's)
        #[arg(required = true)]
        accounts: Vec<String>,
    },
    /// Store a Strava credential from an authorization code
    Authorize {
        account: String,

        /// Code returned to the redirect URI after consent
        #[arg(long)]
        code: String,

        #[arg(long)]
        redirect_uri: Option<String>,
    },
    /// Forget the stored Strava credential for an account
    Logout { account: String },
}

fn parse_source(raw: &str) -> Result<Source, String> {
    Source::from_str(raw)
}

/// RFC 3339 timestamp or integer unix seconds
pub fn parse_since(raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    let secs: i64 = raw
        .parse()
        .map_err(|_| format!("expected RFC 3339 or unix seconds, got {raw:?}"))?;
    DateTime::from_timestamp(secs, 0).ok_or_else(|| format!("timestamp out of range: {secs}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_since_accepts_both_forms() {
        let expected = Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_since("2026-04-01T00:00:00Z").unwrap(), expected);
        assert_eq!(parse_since("2026-04-01T02:00:00+02:00").unwrap(), expected);
        assert_eq!(parse_since(&expected.timestamp().to_string()).unwrap(), expected);
        assert!(parse_since("last tuesday").is_err());
    }

    #[test]
    fn test_sync_arguments() {
        let cli = Cli::try_parse_from([
            "coach-sync",
            "sync",
            "--source",
            "hevy",
            "--since",
            "1775001600",
            "alice",
            "bob",
        ])
        .unwrap();

        match cli.command {
            Command::Sync {
                source,
                since,
                force,
                accounts,
            } => {
                assert_eq!(source, Source::Hevy);
                assert_eq!(since.map(|s| s.timestamp()), Some(1775001600));
                assert!(!force);
                assert_eq!(accounts, vec!["alice", "bob"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_sync_defaults_to_strava_and_needs_an_account() {
        let cli = Cli::try_parse_from(["coach-sync", "sync", "me"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Sync {
                source: Source::Strava,
                since: None,
                ..
            }
        ));

        assert!(Cli::try_parse_from(["coach-sync", "sync"]).is_err());
        assert!(Cli::try_parse_from(["coach-sync", "sync", "--source", "garmin", "me"]).is_err());
    }

    #[test]
    fn test_authorize_arguments() {
        let cli = Cli::try_parse_from([
            "coach-sync",
            "authorize",
            "me",
            "--code",
            "abc",
            "--redirect-uri",
            "http://localhost/cb",
        ])
        .unwrap();

        match cli.command {
            Command::Authorize {
                account,
                code,
                redirect_uri,
            } => {
                assert_eq!(account, "me");
                assert_eq!(code, "abc");
                assert_eq!(redirect_uri.as_deref(), Some("http://localhost/cb"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
