//! coach-sync - Workout sync worker
//!
//! Runs one sync pass over the given accounts and exits with a code a job
//! scheduler can act on: 0 done, 75 retry later, 1 needs attention.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use log::{error, info};
use workouts::{AccountId, AppConfig, CredentialStore, SqliteActivityStore, UreqTransport};

mod cli;
mod worker;

use cli::{Cli, Command};

fn main() -> ExitCode {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(worker::EXIT_FAILURE as u8)
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    // Bootstrap config directory
    config::init().context("Failed to initialize config directory")?;
    let cfg = AppConfig::load()?;
    let store = Arc::new(SqliteActivityStore::open_default()?);

    match cli.command {
        Command::Sync {
            source,
            since,
            force,
            accounts,
        } => {
            let accounts: Vec<AccountId> = accounts.into_iter().map(AccountId::new).collect();
            worker::check_accounts(source, &accounts)?;
            let accounts = if force || since.is_some() {
                accounts
            } else {
                worker::due_accounts(
                    store.as_ref(),
                    &accounts,
                    source,
                    Utc::now(),
                    cfg.sync.cooldown_secs,
                )?
            };
            if accounts.is_empty() {
                info!("Nothing to sync");
                return Ok(worker::EXIT_OK);
            }

            let engine = worker::build_engine(&cfg, source, store)?;
            let outcomes = engine.sync_accounts(&accounts, since);
            Ok(worker::exit_code(&outcomes))
        }
        Command::Authorize {
            account,
            code,
            redirect_uri,
        } => {
            let transport = Arc::new(UreqTransport::new(cfg.http_timeout()));
            let manager = worker::token_manager(&cfg, store, transport)?;
            let account = AccountId::new(account);
            match manager.authorize(&account, &code, redirect_uri.as_deref()) {
                Ok(credential) => {
                    info!(
                        "Authorized {} (token expires {})",
                        account, credential.expires_at
                    );
                    Ok(worker::EXIT_OK)
                }
                Err(e) => Ok(worker::exit_code(&[(account, Err(e))])),
            }
        }
        Command::Logout { account } => {
            let account = AccountId::new(account);
            store.delete(&account)?;
            info!("Removed credential for {}", account);
            Ok(worker::EXIT_OK)
        }
    }
}
