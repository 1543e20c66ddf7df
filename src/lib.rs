//! Oops - run a source file and have its errors explained
//!
//! This library provides the core of the `oops` CLI tool: running a file
//! with the toolchain its extension selects, streaming the output, and
//! sending anything written to stderr to a chat completion service.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod explainer;
pub mod host;
pub mod interactive;
pub mod languages;
pub mod providers;
pub mod runner;
pub mod secrets;
pub mod session;
pub mod terminal;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use cli::{Cli, Command};
pub use config::Config;
pub use error::CommandError;
pub use languages::{resolve_command, RunRequest};
pub use session::{Host, Session};
