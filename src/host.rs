//! Narrow interfaces to the environment hosting a session.
//!
//! The pipeline never prints or reads the terminal directly; it goes through
//! these traits. `terminal` implements them for the CLI.

use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Mutex;

/// Append-only text sink where process output and explanations go
pub trait LogSurface: Send + Sync {
    fn append_line(&self, line: &str);

    fn append(&self, text: &str);

    /// Bring the surface to the foreground
    fn show(&self, preserve_focus: bool);

    /// Append several lines with no other writer interleaved
    fn append_block(&self, lines: &[&str]) {
        for line in lines {
            self.append_line(line);
        }
    }
}

/// User-visible notifications and the status indicator
pub trait Notifier: Send + Sync {
    fn info(&self, message: &str);

    fn warn(&self, message: &str);

    fn error(&self, message: &str);

    /// Reflect the current explanation state
    fn status(&self, enabled: bool);
}

/// Asks the user for the API key
#[async_trait]
pub trait CredentialPrompt: Send + Sync {
    /// Returns `None` when the user declines
    async fn prompt(&self, message: &str) -> Result<Option<String>>;
}

/// Source of the document a run operates on
pub trait ActiveDocument: Send + Sync {
    fn active_document(&self) -> Option<PathBuf>;
}

/// Active document held in memory, set by the CLI or `open` in a session
#[derive(Debug, Default)]
pub struct DocumentSlot {
    current: Mutex<Option<PathBuf>>,
}

impl DocumentSlot {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            current: Mutex::new(path),
        }
    }

    pub fn open(&self, path: PathBuf) {
        if let Ok(mut current) = self.current.lock() {
            *current = Some(path);
        }
    }
}

impl ActiveDocument for DocumentSlot {
    fn active_document(&self) -> Option<PathBuf> {
        self.current.lock().ok().and_then(|c| c.clone())
    }
}
