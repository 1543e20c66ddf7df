//! Credential storage.
//!
//! The API key is kept in a small TOML file under the user's state
//! directory, readable only by the owner on Unix.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Key name the API credential is stored under
pub const API_KEY_SECRET: &str = "openai-api-key";

/// Persistent key/value store for secrets
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a key, returning whether it was present
    async fn delete(&self, key: &str) -> Result<bool>;
}

/// State directory for persisted secrets
pub fn get_state_dir() -> Option<PathBuf> {
    // XDG_STATE_HOME or fallback to ~/.local/state
    if let Ok(state_home) = std::env::var("XDG_STATE_HOME") {
        if !state_home.is_empty() {
            return Some(PathBuf::from(state_home).join("oops"));
        }
    }
    dirs::home_dir().map(|h| h.join(".local").join("state").join("oops"))
}

/// Options for a new file that only the owner can read, set at creation
fn owner_only_options() -> OpenOptions {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);
    options
}

/// Secret store backed by a TOML file
pub struct FileSecretStore {
    path: PathBuf,
}

impl FileSecretStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the default location (`$XDG_STATE_HOME/oops/secrets.toml`)
    pub fn open_default() -> Result<Self> {
        let dir = get_state_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine state directory"))?;
        Ok(Self::new(dir.join("secrets.toml")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<BTreeMap<String, String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", self.path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", self.path.display())),
        }
    }

    async fn write_all(&self, secrets: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let contents = toml::to_string(secrets)?;
        let staging = self.path.with_extension("toml.tmp");
        match tokio::fs::remove_file(&staging).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to remove {}", staging.display()))
            }
        }

        let mut file = owner_only_options()
            .open(&staging)
            .await
            .with_context(|| format!("Failed to create {}", staging.display()))?;
        file.write_all(contents.as_bytes())
            .await
            .with_context(|| format!("Failed to write {}", staging.display()))?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&staging, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        Ok(())
    }
}

#[async_trait]
impl SecretStore for FileSecretStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .read_all()
            .await?
            .remove(key)
            .filter(|v| !v.is_empty()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut secrets = self.read_all().await?;
        secrets.insert(key.to_string(), value.to_string());
        self.write_all(&secrets).await?;
        debug!(key, path = %self.path.display(), "secret stored");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut secrets = self.read_all().await?;
        let existed = secrets.remove(key).is_some();
        if existed {
            self.write_all(&secrets).await?;
        }
        Ok(existed)
    }
}
