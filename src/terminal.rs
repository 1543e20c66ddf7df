//! Terminal implementations of the host interfaces.
//!
//! Process output and explanations go to stdout; notifications and the
//! status indicator go to stderr so they never mix with captured output.

use anyhow::{Context, Result};
use async_trait::async_trait;
use colored::Colorize;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::commands::StatusReport;
use crate::config::{Config, TomlSettings};
use crate::explainer::{BLOCK_FOOTER, BLOCK_HEADER};
use crate::host::{CredentialPrompt, DocumentSlot, LogSurface, Notifier};
use crate::providers::openai::OpenAIClient;
use crate::providers::{api_key_from_env, CompletionClient};
use crate::runner::ShellSpawner;
use crate::secrets::FileSecretStore;
use crate::session::{Host, Session};

/// Width used to wrap notifications
const WRAP_WIDTH: usize = 76;

/// Log surface writing to stdout.
///
/// Whole lines always start at column zero, even when the process left its
/// last output without a trailing newline.
pub struct TerminalLog {
    state: Mutex<LogState>,
}

struct LogState {
    out: Box<dyn Write + Send>,
    mid_line: bool,
}

impl LogState {
    fn break_line(&mut self) {
        if self.mid_line {
            let _ = writeln!(self.out);
            self.mid_line = false;
        }
    }
}

impl TerminalLog {
    pub fn stdout() -> Self {
        Self::with_writer(Box::new(io::stdout()))
    }

    pub fn with_writer(out: Box<dyn Write + Send>) -> Self {
        Self {
            state: Mutex::new(LogState {
                out,
                mid_line: false,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn styled_line(line: &str) -> String {
    if line == BLOCK_HEADER || line == BLOCK_FOOTER {
        line.magenta().bold().to_string()
    } else if line.starts_with("> ") {
        line.dimmed().to_string()
    } else {
        line.to_string()
    }
}

impl LogSurface for TerminalLog {
    fn append_line(&self, line: &str) {
        let mut state = self.state();
        state.break_line();
        let _ = writeln!(state.out, "{}", styled_line(line));
        let _ = state.out.flush();
    }

    fn append(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        let mut state = self.state();
        let _ = state.out.write_all(text.as_bytes());
        let _ = state.out.flush();
        state.mid_line = !text.ends_with('\n');
    }

    fn show(&self, _preserve_focus: bool) {
        let _ = self.state().out.flush();
    }

    fn append_block(&self, lines: &[&str]) {
        let mut state = self.state();
        state.break_line();
        for line in lines {
            let _ = writeln!(state.out, "{}", styled_line(line));
        }
        let _ = state.out.flush();
    }
}

/// Format an error notification
pub fn format_error(message: &str, tip: Option<&str>) -> String {
    let mut output = format!("{} {}", "Error:".red().bold(), message);
    if let Some(tip) = tip {
        output.push('\n');
        output.push_str(&format!("{} {}", "Tip:".blue().bold(), tip));
    }
    output
}

/// Notifications on stderr
#[derive(Debug, Default)]
pub struct TerminalNotifier {
    /// Suppress info and status lines
    pub quiet: bool,
}

impl TerminalNotifier {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl Notifier for TerminalNotifier {
    fn info(&self, message: &str) {
        if !self.quiet {
            eprintln!("{} {}", "▸".blue(), message);
        }
    }

    fn warn(&self, message: &str) {
        let mut lines = textwrap::wrap(message, WRAP_WIDTH).into_iter();
        if let Some(first) = lines.next() {
            eprintln!("{} {}", "Warning:".yellow().bold(), first);
        }
        for line in lines {
            eprintln!("         {line}");
        }
    }

    fn error(&self, message: &str) {
        eprintln!("{}", format_error(message, None));
    }

    fn status(&self, enabled: bool) {
        if self.quiet {
            return;
        }
        if enabled {
            eprintln!("{} {}", "●".green(), "Explain: on".green().bold());
        } else {
            eprintln!("{} {}", "○".dimmed(), "Explain: off".dimmed());
        }
    }
}

/// Reads the API key with echo disabled
#[derive(Debug, Default)]
pub struct TerminalPrompt;

#[async_trait]
impl CredentialPrompt for TerminalPrompt {
    async fn prompt(&self, message: &str) -> Result<Option<String>> {
        if !io::stdin().is_terminal() {
            return Ok(None);
        }
        let message = message.to_string();
        tokio::task::spawn_blocking(move || read_hidden(&message))
            .await
            .context("Key prompt was interrupted")?
    }
}

fn read_hidden(message: &str) -> Result<Option<String>> {
    eprint!("{} {} ", "?".cyan().bold(), message);
    io::stderr().flush()?;

    terminal::enable_raw_mode().context("Failed to enable raw mode")?;
    let result = read_hidden_line();
    let restored = terminal::disable_raw_mode();
    eprintln!();
    restored.context("Failed to restore terminal")?;
    result
}

fn read_hidden_line() -> Result<Option<String>> {
    let mut input = String::new();
    loop {
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind == KeyEventKind::Release {
            continue;
        }
        match key.code {
            KeyCode::Enter => break,
            KeyCode::Esc => return Ok(None),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return Ok(None)
            }
            KeyCode::Backspace => {
                input.pop();
            }
            KeyCode::Char(c) => input.push(c),
            _ => {}
        }
    }
    let key = input.trim().to_string();
    Ok((!key.is_empty()).then_some(key))
}

/// Print a status report the way `oops status` shows it
pub fn print_status(report: &StatusReport) {
    println!("{}", "oops status".bold());
    println!();
    if report.enabled {
        println!("  {} {}", "Explain:".blue().bold(), "Enabled".green().bold());
    } else {
        println!("  {} {}", "Explain:".blue().bold(), "Disabled".red().bold());
    }
    match report.key_source {
        Some(source) => println!("  {} {}", "API key:".blue().bold(), source),
        None => println!("  {} {}", "API key:".blue().bold(), "Not configured".dimmed()),
    }
    println!("  {} {}", "Model:".blue().bold(), report.model);
    if report.running {
        println!("  {} {}", "Run:".blue().bold(), "In progress".yellow());
    }
    if let Some(path) = Config::config_path() {
        println!("  {} {}", "Config:".blue().bold(), path.display());
    }
    println!();
}

/// Build a session wired to the terminal, config files and the shell
pub fn terminal_session(
    document: Option<PathBuf>,
    quiet: bool,
) -> Result<(Arc<Session>, Arc<DocumentSlot>)> {
    let settings = Arc::new(TomlSettings::discover());
    let provider = settings.config().openai;
    let documents = Arc::new(DocumentSlot::new(document));

    let host = Host {
        log: Arc::new(TerminalLog::stdout()),
        notifier: Arc::new(TerminalNotifier::new(quiet)),
        prompt: Arc::new(TerminalPrompt),
        secrets: Arc::new(FileSecretStore::open_default()?),
        settings,
        documents: documents.clone(),
        spawner: Arc::new(ShellSpawner),
    };

    let client_config = provider.clone();
    let session = Session::new(
        host,
        provider,
        Box::new(move |key| {
            Arc::new(OpenAIClient::new(key, &client_config)) as Arc<dyn CompletionClient>
        }),
    )
    .with_env_key(api_key_from_env());

    Ok((Arc::new(session), documents))
}
