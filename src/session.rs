//! Per-process session state.
//!
//! A [`Session`] owns the explanation flag, the run state machine and the
//! lazily created completion client, together with the host collaborators
//! every operation needs. It is created once at startup and passed to each
//! command explicitly.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::{Setting, SettingsStore};
use crate::error::CommandError;
use crate::host::{ActiveDocument, CredentialPrompt, LogSurface, Notifier};
use crate::providers::{CompletionClient, ProviderConfig};
use crate::runner::Spawner;
use crate::secrets::{SecretStore, API_KEY_SECRET};

const KEY_PROMPT: &str = "Enter your OpenAI API Key (sk-...):";

const KEY_REQUIRED: &str =
    "An OpenAI API key is required to explain errors. Set OPENAI_API_KEY or enter it when prompted.";

/// Builds a completion client from an API key
pub type ClientFactory = Box<dyn Fn(String) -> Arc<dyn CompletionClient> + Send + Sync>;

/// Whether a run-with-explanation is active
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
}

/// Where the API key was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Environment,
    Store,
}

impl fmt::Display for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySource::Environment => write!(f, "environment (OPENAI_API_KEY)"),
            KeySource::Store => write!(f, "secret store"),
        }
    }
}

/// Collaborators supplied by the host environment
#[derive(Clone)]
pub struct Host {
    pub log: Arc<dyn LogSurface>,
    pub notifier: Arc<dyn Notifier>,
    pub prompt: Arc<dyn CredentialPrompt>,
    pub secrets: Arc<dyn SecretStore>,
    pub settings: Arc<dyn SettingsStore>,
    pub documents: Arc<dyn ActiveDocument>,
    pub spawner: Arc<dyn Spawner>,
}

pub struct Session {
    host: Host,
    provider: ProviderConfig,
    client_factory: ClientFactory,
    env_key: Option<String>,
    enabled: AtomicBool,
    state: Mutex<RunState>,
    client: OnceCell<Arc<dyn CompletionClient>>,
}

impl Session {
    /// Create a session; the enabled flag starts from `enable_on_startup`
    pub fn new(host: Host, provider: ProviderConfig, client_factory: ClientFactory) -> Self {
        let enabled = host.settings.get(Setting::EnableOnStartup);
        debug!(enabled, model = %provider.model, "session created");
        Self {
            host,
            provider,
            client_factory,
            env_key: None,
            enabled: AtomicBool::new(enabled),
            state: Mutex::new(RunState::Idle),
            client: OnceCell::new(),
        }
    }

    /// Key taken from the environment, preferred over the secret store
    pub fn with_env_key(mut self, key: Option<String>) -> Self {
        self.env_key = key;
        self
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn provider(&self) -> &ProviderConfig {
        &self.provider
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// The client, if one has been constructed
    pub fn client(&self) -> Option<Arc<dyn CompletionClient>> {
        self.client.get().cloned()
    }

    /// Return the client, acquiring the key and constructing it on first use.
    ///
    /// Once set the client is never replaced for the rest of the session.
    pub async fn ensure_client(&self) -> Result<Arc<dyn CompletionClient>, CommandError> {
        let client = self
            .client
            .get_or_try_init(|| async {
                let key = self.acquire_api_key().await?;
                let client = (self.client_factory)(key);
                info!(provider = client.name(), model = client.model(), "completion client ready");
                Ok::<_, CommandError>(client)
            })
            .await?;
        Ok(Arc::clone(client))
    }

    /// Look up the key in the environment, then the store, then ask the user
    async fn acquire_api_key(&self) -> Result<String, CommandError> {
        if let Some(key) = &self.env_key {
            return Ok(key.clone());
        }

        let stored = self
            .host
            .secrets
            .get(API_KEY_SECRET)
            .await
            .map_err(|e| CommandError::credential(format!("Failed to read API key: {e:#}")))?;
        if let Some(key) = stored {
            return Ok(key);
        }

        let entered = self
            .host
            .prompt
            .prompt(KEY_PROMPT)
            .await
            .map_err(|e| CommandError::credential(format!("Failed to read API key: {e:#}")))?;

        match entered.map(|k| k.trim().to_string()).filter(|k| !k.is_empty()) {
            Some(key) => {
                self.host
                    .secrets
                    .set(API_KEY_SECRET, &key)
                    .await
                    .map_err(|e| {
                        CommandError::credential(format!("Failed to store API key: {e:#}"))
                    })?;
                Ok(key)
            }
            None => Err(CommandError::credential(KEY_REQUIRED)),
        }
    }

    /// Where a key would come from, without prompting
    pub async fn key_source(&self) -> Option<KeySource> {
        if self.env_key.is_some() {
            return Some(KeySource::Environment);
        }
        match self.host.secrets.get(API_KEY_SECRET).await {
            Ok(Some(_)) => Some(KeySource::Store),
            _ => None,
        }
    }

    pub fn run_state(&self) -> RunState {
        *self.lock_state()
    }

    /// Move `Idle -> Running`, or return `None` if a run is already active.
    ///
    /// The returned guard moves the state back to `Idle` when dropped.
    pub fn try_begin_run(&self) -> Option<RunGuard<'_>> {
        let mut state = self.lock_state();
        match *state {
            RunState::Running => None,
            RunState::Idle => {
                *state = RunState::Running;
                Some(RunGuard { session: self })
            }
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RunState> {
        // The state is a plain enum, so a poisoned lock still holds a valid value
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Releases the run state on every exit path
pub struct RunGuard<'a> {
    session: &'a Session,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        *self.session.lock_state() = RunState::Idle;
        debug!("run state back to idle");
    }
}
