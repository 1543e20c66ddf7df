//! Line-driven session where files can be opened, run and re-run while
//! explanation is toggled in between.

use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::commands;
use crate::error::CommandError;
use crate::host::DocumentSlot;
use crate::session::Session;
use crate::terminal::print_status;

const HELP: &str = "\
Commands:
  open <file>   Make <file> the active document
  run           Run the active document
  toggle        Turn error explanation on or off
  status        Show the current state
  help          Show this help
  quit          Leave the session (waits for a running process)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Open(PathBuf),
    Run,
    Toggle,
    Status,
    Help,
    Quit,
    Empty,
}

pub fn parse_command(line: &str) -> Result<SessionCommand, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word.to_ascii_lowercase().as_str() {
        "" => SessionCommand::Empty,
        "open" | "o" => {
            if rest.is_empty() {
                return Err("Usage: open <file>".to_string());
            }
            SessionCommand::Open(PathBuf::from(unquote(rest)))
        }
        "run" | "r" => SessionCommand::Run,
        "toggle" | "t" => SessionCommand::Toggle,
        "status" | "s" => SessionCommand::Status,
        "help" | "h" | "?" => SessionCommand::Help,
        "quit" | "q" | "exit" => SessionCommand::Quit,
        other => return Err(format!("Unknown command: {other} (try `help`)")),
    };

    if !rest.is_empty() && !matches!(command, SessionCommand::Open(_)) {
        return Err(format!("`{word}` takes no arguments"));
    }
    Ok(command)
}

fn unquote(path: &str) -> &str {
    path.strip_prefix('"')
        .and_then(|p| p.strip_suffix('"'))
        .or_else(|| path.strip_prefix('\'').and_then(|p| p.strip_suffix('\'')))
        .unwrap_or(path)
}

fn print_prompt() {
    eprint!("{} ", "oops>".cyan().bold());
}

/// Read commands from stdin until `quit` or end of input.
///
/// Runs execute in the background so `toggle` and `status` stay responsive
/// while a process is producing output.
pub async fn run_interactive(session: Arc<Session>, documents: Arc<DocumentSlot>) -> Result<()> {
    let notifier = Arc::clone(&session.host().notifier);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut current_run: Option<JoinHandle<()>> = None;

    notifier.info("Type `help` for commands");
    print_prompt();

    while let Some(line) = lines.next_line().await? {
        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(message) => {
                notifier.warn(&message);
                print_prompt();
                continue;
            }
        };
        debug!(?command, "session command");

        match command {
            SessionCommand::Empty => {}
            SessionCommand::Open(path) => {
                notifier.info(&format!("Active file: {}", path.display()));
                documents.open(path);
            }
            SessionCommand::Run => {
                if current_run.as_ref().is_some_and(|h| !h.is_finished()) {
                    notifier.info("A run is already in progress");
                } else {
                    match start_run(&session).await {
                        Ok(handle) => current_run = Some(handle),
                        Err(e) => notifier.error(&e.to_string()),
                    }
                }
            }
            SessionCommand::Toggle => {
                if let Err(e) = commands::toggle_explanation(&session).await {
                    notifier.error(&e.to_string());
                }
            }
            SessionCommand::Status => print_status(&commands::status(&session).await),
            SessionCommand::Help => eprintln!("{HELP}"),
            SessionCommand::Quit => break,
        }
        print_prompt();
    }

    if let Some(handle) = current_run {
        if !handle.is_finished() {
            notifier.info("Waiting for the running process to finish");
        }
        if let Err(e) = handle.await {
            warn!(error = %e, "run task failed");
        }
    }
    Ok(())
}

/// Start a background run once the client exists.
///
/// The key prompt reads the terminal itself, so it must finish while the
/// command loop is waiting here and not reading stdin.
async fn start_run(session: &Arc<Session>) -> Result<JoinHandle<()>, CommandError> {
    session.ensure_client().await?;
    Ok(spawn_run(Arc::clone(session)))
}

fn spawn_run(session: Arc<Session>) -> JoinHandle<()> {
    tokio::spawn(async move {
        match commands::run_with_explanation(&session).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                let notifier = &session.host().notifier;
                notifier.info("A run is already in progress");
            }
            Err(e) => session.host().notifier.error(&e.to_string()),
        }
        print_prompt();
    })
}
