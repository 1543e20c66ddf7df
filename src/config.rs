//! Configuration system for the `oops` tool.
//!
//! Settings live in TOML files: a global one under the user's config
//! directory and an optional workspace one (`./.oops.toml`) whose keys win.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use toml::{Table, Value};
use tracing::debug;

use crate::providers::ProviderConfig;

/// Workspace config file name, looked up in the current directory
pub const WORKSPACE_CONFIG_FILE: &str = ".oops.toml";

/// Explanation behavior
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ExplainConfig {
    /// Start every session with explanation enabled
    pub enable_on_startup: bool,
    /// Warn that explanations call a paid API when enabling
    pub show_cost_warning: bool,
}

impl Default for ExplainConfig {
    fn default() -> Self {
        Self {
            enable_on_startup: false,
            show_cost_warning: true,
        }
    }
}

/// Root configuration structure
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub explain: ExplainConfig,
    pub openai: ProviderConfig,
}

/// Boolean settings the session reads and writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Setting {
    EnableOnStartup,
    ShowCostWarning,
}

impl Setting {
    /// Key inside the `[explain]` table
    pub fn key(self) -> &'static str {
        match self {
            Setting::EnableOnStartup => "enable_on_startup",
            Setting::ShowCostWarning => "show_cost_warning",
        }
    }

    fn read(self, config: &ExplainConfig) -> bool {
        match self {
            Setting::EnableOnStartup => config.enable_on_startup,
            Setting::ShowCostWarning => config.show_cost_warning,
        }
    }

    fn write(self, config: &mut ExplainConfig, value: bool) {
        match self {
            Setting::EnableOnStartup => config.enable_on_startup = value,
            Setting::ShowCostWarning => config.show_cost_warning = value,
        }
    }
}

/// Which file an update is written to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigScope {
    Global,
    Workspace,
}

/// Read/write access to persisted settings
#[async_trait]
pub trait SettingsStore: Send + Sync {
    fn get(&self, setting: Setting) -> bool;

    /// File that decides `setting` at the next startup
    fn scope_for(&self, _setting: Setting) -> ConfigScope {
        ConfigScope::Global
    }

    async fn update(&self, setting: Setting, value: bool, scope: ConfigScope) -> Result<()>;
}

impl Config {
    /// Load the global and workspace files, returning defaults where missing
    pub fn load() -> Self {
        let workspace = env::current_dir()
            .ok()
            .map(|dir| dir.join(WORKSPACE_CONFIG_FILE));
        Self::load_layered(Self::config_path(), workspace)
    }

    /// Load config from a specific path
    pub fn load_from_path(path: Option<PathBuf>) -> Self {
        Self::load_layered(path, None)
    }

    /// Load a global file, then overlay the keys of a workspace file
    pub fn load_layered(global: Option<PathBuf>, workspace: Option<PathBuf>) -> Self {
        let mut merged = read_table(global.as_deref());
        merge_tables(&mut merged, read_table(workspace.as_deref()));
        Value::Table(merged)
            .try_into::<Config>()
            .unwrap_or_default()
    }

    /// Get the global config file path (~/.config/oops/config.toml)
    pub fn config_path() -> Option<PathBuf> {
        if let Ok(path) = env::var("OOPS_CONFIG") {
            if !path.is_empty() {
                return Some(PathBuf::from(path));
            }
        }
        dirs::config_dir().map(|p| p.join("oops").join("config.toml"))
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        // OOPS_EXPLAIN=1 / OOPS_EXPLAIN=0 forces the startup state
        match env::var("OOPS_EXPLAIN").as_deref() {
            Ok("1") => self.explain.enable_on_startup = true,
            Ok("0") => self.explain.enable_on_startup = false,
            _ => {}
        }
    }
}

fn read_table(path: Option<&Path>) -> Table {
    let Some(path) = path else {
        return Table::new();
    };

    std::fs::read_to_string(path)
        .ok()
        .and_then(|contents| contents.parse::<Table>().ok())
        .unwrap_or_default()
}

fn defines(path: Option<&Path>, setting: Setting) -> bool {
    read_table(path)
        .get("explain")
        .and_then(Value::as_table)
        .is_some_and(|explain| explain.contains_key(setting.key()))
}

fn merge_tables(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        let value = match (base.get_mut(&key), value) {
            (Some(Value::Table(existing)), Value::Table(incoming)) => {
                merge_tables(existing, incoming);
                continue;
            }
            (_, value) => value,
        };
        base.insert(key, value);
    }
}

/// Settings backed by the layered TOML files
pub struct TomlSettings {
    global: Option<PathBuf>,
    workspace: Option<PathBuf>,
    current: Mutex<Config>,
}

impl TomlSettings {
    pub fn new(global: Option<PathBuf>, workspace: Option<PathBuf>) -> Self {
        let mut config = Config::load_layered(global.clone(), workspace.clone());
        config.apply_env_overrides();
        Self {
            global,
            workspace,
            current: Mutex::new(config),
        }
    }

    /// Settings for the standard global and workspace locations
    pub fn discover() -> Self {
        let workspace = env::current_dir()
            .ok()
            .map(|dir| dir.join(WORKSPACE_CONFIG_FILE));
        Self::new(Config::config_path(), workspace)
    }

    /// Snapshot of the merged configuration
    pub fn config(&self) -> Config {
        self.current
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    fn path_for(&self, scope: ConfigScope) -> Option<&Path> {
        match scope {
            ConfigScope::Global => self.global.as_deref(),
            ConfigScope::Workspace => self.workspace.as_deref(),
        }
    }
}

#[async_trait]
impl SettingsStore for TomlSettings {
    fn get(&self, setting: Setting) -> bool {
        match self.current.lock() {
            Ok(config) => setting.read(&config.explain),
            Err(_) => setting.read(&ExplainConfig::default()),
        }
    }

    /// The workspace file wins for keys it sets, so updates go there
    fn scope_for(&self, setting: Setting) -> ConfigScope {
        if defines(self.workspace.as_deref(), setting) {
            ConfigScope::Workspace
        } else {
            ConfigScope::Global
        }
    }

    async fn update(&self, setting: Setting, value: bool, scope: ConfigScope) -> Result<()> {
        let path = self
            .path_for(scope)
            .ok_or_else(|| anyhow::anyhow!("Could not determine config file location"))?
            .to_path_buf();

        let mut table = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents
                .parse::<Table>()
                .with_context(|| format!("Failed to parse {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Table::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        };

        let section = table
            .entry("explain")
            .or_insert(Value::Table(Table::new()));
        match section {
            Value::Table(section) => {
                section.insert(setting.key().to_string(), Value::Boolean(value));
            }
            other => {
                let mut fresh = Table::new();
                fresh.insert(setting.key().to_string(), Value::Boolean(value));
                *other = Value::Table(fresh);
            }
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let contents = toml::to_string_pretty(&table)?;
        tokio::fs::write(&path, contents)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        debug!(key = setting.key(), value, path = %path.display(), "setting updated");

        if let Ok(mut config) = self.current.lock() {
            setting.write(&mut config.explain, value);
        }
        Ok(())
    }
}

/// Generate default config as TOML string
pub fn generate_default_config() -> String {
    r#"# oops - run a file and explain its errors
# Place this file at ~/.config/oops/config.toml
# A .oops.toml in the current directory overrides these keys.

[explain]
# Start with error explanation enabled (default: false)
enable_on_startup = false

# Warn that each explanation calls a paid API (default: true)
show_cost_warning = true

[openai]
model = "gpt-3.5-turbo"
max_tokens = 1024
# base_url = "https://api.openai.com/v1"

# Environment variable overrides:
# OOPS_EXPLAIN=1   - Start with explanation enabled
# OOPS_EXPLAIN=0   - Start with explanation disabled
# OPENAI_API_KEY   - API key (takes precedence over the stored key)
# OOPS_CONFIG      - Path of the global config file
"#
    .to_string()
}

/// Print the default config to stdout
pub fn print_default_config() {
    print!("{}", generate_default_config());
}
