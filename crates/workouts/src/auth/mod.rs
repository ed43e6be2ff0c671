//! Credential storage and OAuth2 token lifecycle

mod manager;
mod oauth;
mod store;

pub use manager::{ApiKey, TokenManager, TokenSource};
pub use oauth::{OAuthClient, TokenGrant};
pub use store::{CredentialStore, FileCredentialStore, InMemoryCredentialStore};
