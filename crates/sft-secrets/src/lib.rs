//! sft-secrets: login/secret verification for the authentication phase
//!
//! Sources (later entries override earlier ones for the same login):
//!   1. `[auth.users]` table inline in sft.toml
//!   2. `[auth].credentials_file` (TOML with a `[users]` table)

use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use sft_core::config::AuthConfig;

/// Answers whether a login/secret pair is valid.
///
/// Shared read-only by every session; implementations must be safe to call
/// concurrently without locking.
pub trait CredentialStore: Send + Sync {
    fn verify(&self, login: &str, secret: &str) -> bool;
}

/// In-memory login → secret map, fixed once built.
#[derive(Default)]
pub struct StaticCredStore {
    users: HashMap<String, SecretString>,
    pub source: String,
}

#[derive(Deserialize)]
struct CredentialsFile {
    #[serde(default)]
    users: HashMap<String, String>,
}

impl StaticCredStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a user. Only valid before the store is shared.
    pub fn with_user(mut self, login: impl Into<String>, secret: impl Into<String>) -> Self {
        self.add_user(login, secret);
        self
    }

    pub fn add_user(&mut self, login: impl Into<String>, secret: impl Into<String>) {
        self.users
            .insert(login.into(), SecretString::from(secret.into()));
    }

    /// Build the store from the `[auth]` config section.
    pub fn load(config: &AuthConfig) -> Result<Self> {
        let mut store = StaticCredStore::new();
        let mut sources = Vec::new();

        if !config.users.is_empty() {
            for (login, secret) in &config.users {
                store.add_user(login.clone(), secret.clone());
            }
            sources.push("config".to_string());
        }

        if let Some(path) = &config.credentials_file {
            let path = sft_core::config::expand_tilde(path);
            let count = store.merge_file(&path)?;
            tracing::debug!(path = %path.display(), users = count, "credentials file loaded");
            sources.push(format!("file:{}", path.display()));
        }

        store.source = if sources.is_empty() {
            "none".into()
        } else {
            sources.join("+")
        };
        Ok(store)
    }

    /// Merge users from a TOML credentials file, returning how many were read.
    pub fn merge_file(&mut self, path: &Path) -> Result<usize> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading credentials file: {}", path.display()))?;
        let file: CredentialsFile = toml::from_str(&content)
            .with_context(|| format!("parsing credentials file: {}", path.display()))?;

        let count = file.users.len();
        for (login, secret) in file.users {
            self.add_user(login, secret);
        }
        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl CredentialStore for StaticCredStore {
    fn verify(&self, login: &str, secret: &str) -> bool {
        self.users
            .get(login)
            .is_some_and(|stored| stored.expose_secret() == secret)
    }
}

impl std::fmt::Debug for StaticCredStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredStore")
            .field("users", &self.users.len())
            .field("source", &self.source)
            .finish()
    }
}
