use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::{generate, Shell};
use colored::Colorize;
use std::io::{self, BufRead, IsTerminal};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use oops::cli::{Cli, Command};
use oops::commands;
use oops::config::print_default_config;
use oops::error::CommandError;
use oops::interactive::run_interactive;
use oops::terminal::{format_error, print_status, terminal_session};

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "oops=debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn print_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "oops", &mut io::stdout());
}

fn get_input(words: &[String]) -> Result<String> {
    if !words.is_empty() {
        return Ok(words.join(" "));
    }

    if !io::stdin().is_terminal() {
        let mut input = String::new();
        for line in io::stdin().lock().lines() {
            input.push_str(&line?);
            input.push('\n');
        }
        let trimmed = input.trim().to_string();
        if !trimmed.is_empty() {
            return Ok(trimmed);
        }
    }

    Err(NoInput.into())
}

#[derive(Debug, thiserror::Error)]
#[error("No input provided. Usage: oops explain <error message>")]
struct NoInput;

fn tip_for(error: &anyhow::Error) -> Option<&'static str> {
    if error.is::<NoInput>() {
        return Some("Pipe stderr in: command 2>&1 | oops explain");
    }
    match error.downcast_ref::<CommandError>()? {
        CommandError::NoActiveDocument => Some("Pass the file to run: oops run <file>"),
        CommandError::Credential(_) => Some("Set OPENAI_API_KEY or store a key with `oops key`"),
        CommandError::UnsupportedFileType { .. } => {
            Some("Supported: js py java c cpp cs go rb php ts swift r scala")
        }
        _ => None,
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    let document = match &cli.command {
        Command::Run { file } | Command::Session { file } => file.clone(),
        _ => None,
    };
    let (session, documents) = terminal_session(document, cli.quiet)?;

    match cli.command {
        Command::Run { .. } => {
            if commands::run_with_explanation(&session).await?.is_none() {
                session.host().notifier.info("A run is already in progress");
            }
        }
        Command::Toggle => {
            commands::toggle_explanation(&session).await?;
        }
        Command::Status => print_status(&commands::status(&session).await),
        Command::Explain { file: Some(path), .. } => {
            commands::explain_document(&session, &path)
                .await
                .with_context(|| format!("Could not explain {}", path.display()))?;
        }
        Command::Explain { file: None, error } => {
            let input = get_input(&error)?;
            commands::explain_text(&session, &input).await?;
        }
        Command::Session { .. } => run_interactive(session, documents).await?,
        Command::Key { forget: true } => {
            commands::forget_key(&session).await?;
        }
        Command::Key { forget: false } => commands::store_key(&session).await?,
        Command::Config | Command::Completions { .. } => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Config => {
            print_default_config();
            return ExitCode::SUCCESS;
        }
        Command::Completions { shell } => {
            print_completions(shell);
            return ExitCode::SUCCESS;
        }
        _ => {}
    }

    match dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let tip = tip_for(&e).map(|t| t.dimmed().to_string());
            eprintln!("{}", format_error(&format!("{e:#}"), tip.as_deref()));
            ExitCode::FAILURE
        }
    }
}
