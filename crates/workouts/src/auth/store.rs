//! Credential persistence
//!
//! Pure storage, no network. The SQLite-backed implementation lives with
//! the other SQLite tables in [`crate::storage::SqliteActivityStore`].

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::{Context, Result, anyhow};

use crate::models::{AccountId, Credential};

/// Storage for one [`Credential`] per account
pub trait CredentialStore: Send + Sync {
    fn load(&self, account_id: &AccountId) -> Result<Option<Credential>>;

    /// Insert or replace the credential for `credential.account_id`
    fn save(&self, credential: &Credential) -> Result<()>;

    /// Remove the credential; deleting a missing one is not an error
    fn delete(&self, account_id: &AccountId) -> Result<()>;
}

/// One JSON file per account, replaced atomically on save
///
/// ```text
/// credentials/
///   me.json
///   athlete-42.json
/// ```
pub struct FileCredentialStore {
    dir: PathBuf,
}

impl FileCredentialStore {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        config::ensure_dir(&dir)?;
        Ok(Self { dir })
    }

    /// Store under `~/.config/coachgpt/credentials`
    pub fn default_location() -> Result<Self> {
        let dir = config::config_path("credentials")
            .context("Could not determine config directory")?;
        Self::new(dir)
    }

    fn path_for(&self, account_id: &AccountId) -> PathBuf {
        self.dir.join(format!(
            "{}.json",
            crate::cache::key::sanitize(account_id.as_str())
        ))
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self, account_id: &AccountId) -> Result<Option<Credential>> {
        let path = self.path_for(account_id);
        if !path.exists() {
            return Ok(None);
        }
        let credential: Credential = config::load_json_file(&path)?;
        Ok(Some(credential))
    }

    fn save(&self, credential: &Credential) -> Result<()> {
        config::save_json_file(&self.path_for(&credential.account_id), credential)
    }

    fn delete(&self, account_id: &AccountId) -> Result<()> {
        let path = self.path_for(account_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to delete {}", path.display())),
        }
    }
}

/// In-memory credential store for tests and embedding
#[derive(Default)]
pub struct InMemoryCredentialStore {
    credentials: RwLock<HashMap<AccountId, Credential>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with the given credentials
    pub fn with(credentials: impl IntoIterator<Item = Credential>) -> Self {
        let map = credentials
            .into_iter()
            .map(|c| (c.account_id.clone(), c))
            .collect();
        Self {
            credentials: RwLock::new(map),
        }
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn load(&self, account_id: &AccountId) -> Result<Option<Credential>> {
        let map = self
            .credentials
            .read()
            .map_err(|_| anyhow!("credential lock poisoned"))?;
        Ok(map.get(account_id).cloned())
    }

    fn save(&self, credential: &Credential) -> Result<()> {
        let mut map = self
            .credentials
            .write()
            .map_err(|_| anyhow!("credential lock poisoned"))?;
        map.insert(credential.account_id.clone(), credential.clone());
        Ok(())
    }

    fn delete(&self, account_id: &AccountId) -> Result<()> {
        let mut map = self
            .credentials
            .write()
            .map_err(|_| anyhow!("credential lock poisoned"))?;
        map.remove(account_id);
        Ok(())
    }
}
