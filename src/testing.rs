//! In-memory collaborators for unit tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::{ConfigScope, ExplainConfig, Setting, SettingsStore};
use crate::error::SpawnError;
use crate::host::{CredentialPrompt, DocumentSlot, LogSurface, Notifier};
use crate::providers::{
    CompletionClient, CompletionRequest, CompletionResponse, ProviderConfig, ProviderError,
};
use crate::runner::{ProcessEvent, ProcessHandle, Spawner};
use crate::secrets::{SecretStore, API_KEY_SECRET};
use crate::session::{Host, Session};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry {
    Line(String),
    Text(String),
    Show(bool),
}

#[derive(Default)]
pub struct MemoryLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryLog {
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().unwrap().clone()
    }

    /// Everything written, as it would read in a terminal
    pub fn text(&self) -> String {
        let mut out = String::new();
        for entry in self.entries.lock().unwrap().iter() {
            match entry {
                LogEntry::Line(line) => {
                    out.push_str(line);
                    out.push('\n');
                }
                LogEntry::Text(text) => out.push_str(text),
                LogEntry::Show(_) => {}
            }
        }
        out
    }
}

impl LogSurface for MemoryLog {
    fn append_line(&self, line: &str) {
        self.entries
            .lock()
            .unwrap()
            .push(LogEntry::Line(line.to_string()));
    }

    fn append(&self, text: &str) {
        self.entries
            .lock()
            .unwrap()
            .push(LogEntry::Text(text.to_string()));
    }

    fn show(&self, preserve_focus: bool) {
        self.entries
            .lock()
            .unwrap()
            .push(LogEntry::Show(preserve_focus));
    }

    fn append_block(&self, lines: &[&str]) {
        let mut entries = self.entries.lock().unwrap();
        entries.extend(lines.iter().map(|l| LogEntry::Line(l.to_string())));
    }
}

#[derive(Default)]
pub struct MemoryNotifier {
    infos: Mutex<Vec<String>>,
    warnings: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
    statuses: Mutex<Vec<bool>>,
}

impl MemoryNotifier {
    pub fn infos(&self) -> Vec<String> {
        self.infos.lock().unwrap().clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<bool> {
        self.statuses.lock().unwrap().clone()
    }
}

impl Notifier for MemoryNotifier {
    fn info(&self, message: &str) {
        self.infos.lock().unwrap().push(message.to_string());
    }

    fn warn(&self, message: &str) {
        self.warnings.lock().unwrap().push(message.to_string());
    }

    fn error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }

    fn status(&self, enabled: bool) {
        self.statuses.lock().unwrap().push(enabled);
    }
}

/// Prompt that always gives the same answer
#[derive(Default)]
pub struct StaticPrompt {
    answer: Mutex<Option<String>>,
    calls: AtomicUsize,
}

impl StaticPrompt {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialPrompt for StaticPrompt {
    async fn prompt(&self, _message: &str) -> Result<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.answer.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct MemorySecrets {
    values: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl SecretStore for MemorySecrets {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.values.lock().unwrap().remove(key).is_some())
    }
}

#[derive(Default)]
pub struct MemorySettings {
    values: Mutex<ExplainConfig>,
    writes: Mutex<Vec<(Setting, bool, ConfigScope)>>,
    workspace_keys: Mutex<Vec<Setting>>,
    fail: AtomicBool,
}

impl MemorySettings {
    pub fn writes(&self) -> Vec<(Setting, bool, ConfigScope)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn fail_writes(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    fn set(&self, setting: Setting, value: bool) {
        let mut values = self.values.lock().unwrap();
        match setting {
            Setting::EnableOnStartup => values.enable_on_startup = value,
            Setting::ShowCostWarning => values.show_cost_warning = value,
        }
    }
}

#[async_trait]
impl SettingsStore for MemorySettings {
    fn get(&self, setting: Setting) -> bool {
        let values = self.values.lock().unwrap();
        match setting {
            Setting::EnableOnStartup => values.enable_on_startup,
            Setting::ShowCostWarning => values.show_cost_warning,
        }
    }

    fn scope_for(&self, setting: Setting) -> ConfigScope {
        if self.workspace_keys.lock().unwrap().contains(&setting) {
            ConfigScope::Workspace
        } else {
            ConfigScope::Global
        }
    }

    async fn update(&self, setting: Setting, value: bool, scope: ConfigScope) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("disk full");
        }
        self.set(setting, value);
        self.writes.lock().unwrap().push((setting, value, scope));
        Ok(())
    }
}

enum Script {
    Events(Vec<ProcessEvent>),
    Manual(Option<mpsc::UnboundedReceiver<ProcessEvent>>),
    Fail(String),
}

/// Spawner that records commands and replays scripted events
pub struct ScriptedSpawner {
    script: Mutex<Script>,
    commands: Mutex<Vec<(String, PathBuf)>>,
}

impl ScriptedSpawner {
    pub fn new(events: Vec<ProcessEvent>) -> Self {
        Self {
            script: Mutex::new(Script::Events(events)),
            commands: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        let spawner = Self::new(Vec::new());
        spawner.fail_with(message);
        spawner
    }

    pub fn set_events(&self, events: Vec<ProcessEvent>) {
        *self.script.lock().unwrap() = Script::Events(events);
    }

    pub fn fail_with(&self, message: &str) {
        *self.script.lock().unwrap() = Script::Fail(message.to_string());
    }

    /// Feed the next spawned process by hand
    pub fn manual(&self) -> mpsc::UnboundedSender<ProcessEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.script.lock().unwrap() = Script::Manual(Some(rx));
        tx
    }

    pub fn commands(&self) -> Vec<(String, PathBuf)> {
        self.commands.lock().unwrap().clone()
    }
}

impl Spawner for ScriptedSpawner {
    fn spawn(&self, command: &str, cwd: &Path) -> Result<ProcessHandle, SpawnError> {
        let mut script = self.script.lock().unwrap();
        let handle = match &mut *script {
            Script::Fail(message) => {
                return Err(SpawnError {
                    command: command.to_string(),
                    message: message.clone(),
                })
            }
            Script::Events(events) => ProcessHandle::from_events(events.clone()),
            Script::Manual(rx) => match rx.take() {
                Some(rx) => ProcessHandle::new(rx),
                None => ProcessHandle::from_events([ProcessEvent::Exited(Some(0))]),
            },
        };
        self.commands
            .lock()
            .unwrap()
            .push((command.to_string(), cwd.to_path_buf()));
        Ok(handle)
    }
}

/// Completion client with a canned reply
pub struct MockClient {
    reply: Mutex<std::result::Result<CompletionResponse, String>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl Default for MockClient {
    fn default() -> Self {
        Self {
            reply: Mutex::new(Ok(CompletionResponse::from_text("Here is what happened."))),
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl MockClient {
    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl CompletionClient for MockClient {
    fn name(&self) -> &'static str {
        "Mock"
    }

    fn model(&self) -> &str {
        "test-model"
    }

    async fn create_completion(
        &self,
        request: &CompletionRequest,
    ) -> std::result::Result<CompletionResponse, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        self.reply
            .lock()
            .unwrap()
            .clone()
            .map_err(|message| ProviderError::ApiError {
                provider: "Mock".to_string(),
                message,
            })
    }
}

/// A full set of in-memory collaborators plus builders for common setups
pub struct TestHost {
    pub log: Arc<MemoryLog>,
    pub notifier: Arc<MemoryNotifier>,
    pub prompt: Arc<StaticPrompt>,
    pub secrets: Arc<MemorySecrets>,
    pub settings: Arc<MemorySettings>,
    pub documents: Arc<DocumentSlot>,
    pub spawner: Arc<ScriptedSpawner>,
    pub client: Arc<MockClient>,
    keys: Arc<Mutex<Vec<String>>>,
}

impl TestHost {
    pub fn new() -> Self {
        let host = Self {
            log: Arc::default(),
            notifier: Arc::default(),
            prompt: Arc::default(),
            secrets: Arc::default(),
            settings: Arc::default(),
            documents: Arc::default(),
            spawner: Arc::new(ScriptedSpawner::new(vec![ProcessEvent::Exited(Some(0))])),
            client: Arc::default(),
            keys: Arc::default(),
        };
        host.settings.set(Setting::EnableOnStartup, false);
        host.settings.set(Setting::ShowCostWarning, true);
        host
    }

    pub fn enabled_on_startup(self, enabled: bool) -> Self {
        self.settings.set(Setting::EnableOnStartup, enabled);
        self
    }

    pub fn show_cost_warning(self, show: bool) -> Self {
        self.settings.set(Setting::ShowCostWarning, show);
        self
    }

    /// Pretend the workspace config file sets `setting`
    pub fn defined_in_workspace(self, setting: Setting) -> Self {
        self.settings.workspace_keys.lock().unwrap().push(setting);
        self
    }

    pub fn with_stored_key(self, key: &str) -> Self {
        self.secrets
            .values
            .lock()
            .unwrap()
            .insert(API_KEY_SECRET.to_string(), key.to_string());
        self
    }

    pub fn with_prompt_answer(self, answer: Option<&str>) -> Self {
        *self.prompt.answer.lock().unwrap() = answer.map(str::to_string);
        self
    }

    pub fn with_document(self, path: &str) -> Self {
        self.documents.open(PathBuf::from(path));
        self
    }

    pub fn with_events(self, events: Vec<ProcessEvent>) -> Self {
        self.spawner.set_events(events);
        self
    }

    pub fn with_reply(self, text: &str) -> Self {
        *self.client.reply.lock().unwrap() = Ok(CompletionResponse::from_text(text));
        self
    }

    pub fn with_failure(self, message: &str) -> Self {
        *self.client.reply.lock().unwrap() = Err(message.to_string());
        self
    }

    pub fn with_empty_response(self) -> Self {
        *self.client.reply.lock().unwrap() = Ok(CompletionResponse::default());
        self
    }

    /// Keys the client factory was called with
    pub fn factory_keys(&self) -> Vec<String> {
        self.keys.lock().unwrap().clone()
    }

    pub fn session(&self) -> Session {
        let host = Host {
            log: self.log.clone(),
            notifier: self.notifier.clone(),
            prompt: self.prompt.clone(),
            secrets: self.secrets.clone(),
            settings: self.settings.clone(),
            documents: self.documents.clone(),
            spawner: self.spawner.clone(),
        };
        let keys = Arc::clone(&self.keys);
        let client = Arc::clone(&self.client);
        let provider = ProviderConfig {
            model: "test-model".to_string(),
            ..ProviderConfig::default()
        };
        Session::new(
            host,
            provider,
            Box::new(move |key| {
                keys.lock().unwrap().push(key);
                Arc::clone(&client) as Arc<dyn CompletionClient>
            }),
        )
    }

    pub fn arc_session(&self) -> Arc<Session> {
        Arc::new(self.session())
    }
}
