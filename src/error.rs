//! Error taxonomy for user-facing commands.

use std::path::PathBuf;

use crate::providers::ProviderError;

/// Errors raised by the command dispatcher.
///
/// Each variant is caught at the boundary of the operation it came from and
/// reported as a single notification.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The API key is missing or the prompt was declined.
    #[error("{0}")]
    Credential(String),

    #[error("Failed to start `{command}`: {message}")]
    Spawn { command: String, message: String },

    #[error("Unsupported file type: .{extension}")]
    UnsupportedFileType { extension: String },

    #[error(transparent)]
    Completion(#[from] ProviderError),

    #[error("No active file. Pass a file path or use `open <file>` first.")]
    NoActiveDocument,

    #[error("Nothing to explain: {} is empty", .0.display())]
    EmptyDocument(PathBuf),

    #[error("Failed to save settings: {0}")]
    Settings(String),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl CommandError {
    pub fn credential(message: impl Into<String>) -> Self {
        Self::Credential(message.into())
    }
}

/// Failure to start a child process.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Failed to start `{command}`: {message}")]
pub struct SpawnError {
    pub command: String,
    pub message: String,
}

impl From<SpawnError> for CommandError {
    fn from(err: SpawnError) -> Self {
        CommandError::Spawn {
            command: err.command,
            message: err.message,
        }
    }
}
